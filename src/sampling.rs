//! Fixed-size uniform sampling over a stream of unknown length.

use rand::Rng;

/// Reservoir sampler (algorithm R).
///
/// After `n` offers every offered item is retained with probability
/// `capacity / n`. Memory is bounded by `capacity` items.
#[derive(Debug)]
pub struct Reservoir<T, R> {
    capacity: usize,
    seen: u64,
    items: Vec<T>,
    rng: R,
}

impl<T, R: Rng> Reservoir<T, R> {
    pub fn new(capacity: usize, rng: R) -> Self {
        Self {
            capacity,
            seen: 0,
            items: Vec::with_capacity(capacity.min(4096)),
            rng,
        }
    }

    /// Offer the next item of the stream.
    pub fn offer(&mut self, item: T) {
        let index = self.seen;
        self.seen += 1;

        if self.items.len() < self.capacity {
            self.items.push(item);
            return;
        }

        let slot = self.rng.random_range(0..=index);
        if slot < self.capacity as u64 {
            self.items[slot as usize] = item;
        }
    }

    /// Number of items offered so far
    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_sample(self) -> Vec<T> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_short_stream_kept_whole() {
        let mut reservoir = Reservoir::new(10, StdRng::seed_from_u64(1));
        for i in 0..4 {
            reservoir.offer(i);
        }
        assert_eq!(reservoir.seen(), 4);
        assert_eq!(reservoir.into_sample(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut reservoir = Reservoir::new(5, StdRng::seed_from_u64(2));
        for i in 0..10_000 {
            reservoir.offer(i);
            assert!(reservoir.len() <= 5);
        }
        assert_eq!(reservoir.len(), 5);
        assert_eq!(reservoir.seen(), 10_000);
    }

    #[test]
    fn test_zero_capacity() {
        let mut reservoir = Reservoir::new(0, StdRng::seed_from_u64(3));
        for i in 0..100 {
            reservoir.offer(i);
        }
        assert!(reservoir.is_empty());
    }

    #[test]
    fn test_inclusion_frequency_is_uniform() {
        const N: usize = 100;
        const CAPACITY: usize = 10;
        const RUNS: usize = 20_000;

        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0usize; N];
        for _ in 0..RUNS {
            let run_rng = StdRng::seed_from_u64(rng.random());
            let mut reservoir = Reservoir::new(CAPACITY, run_rng);
            for i in 0..N {
                reservoir.offer(i);
            }
            for i in reservoir.into_sample() {
                counts[i] += 1;
            }
        }

        // expected inclusion probability is CAPACITY / N = 0.1
        let expected = (RUNS * CAPACITY / N) as f64;
        for (i, &count) in counts.iter().enumerate() {
            let deviation = (count as f64 - expected).abs() / expected;
            assert!(
                deviation < 0.1,
                "item {} included {} times, expected ~{}",
                i,
                count,
                expected
            );
        }
    }
}
