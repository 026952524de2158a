//! Fixed-Capacity Sliding Window

use std::collections::VecDeque;

/// Bounded FIFO window; pushing into a full window evicts the oldest entry
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Stored entries, oldest first
    data: VecDeque<T>,
    /// Maximum number of entries
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new window with given capacity (a zero capacity is raised to one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an entry, returning the evicted entry if the window was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.data.len() >= self.capacity {
            self.data.pop_front()
        } else {
            None
        };
        self.data.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl RingBuffer<f64> {
    /// Copy of the window contents, oldest first
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    /// Arithmetic mean of the window (0.0 when empty)
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    /// Root-mean-square of the window (0.0 when empty)
    pub fn rms(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        (self.data.iter().map(|v| v * v).sum::<f64>() / self.data.len() as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_and_iterate() {
        let mut buffer = RingBuffer::new(10);

        for i in 0..5 {
            assert_eq!(buffer.push(i * 100), None);
        }

        assert_eq!(buffer.len(), 5);
        assert!(!buffer.is_full());
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![0, 100, 200, 300, 400]);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut buffer = RingBuffer::new(0);
        buffer.push(1.0);
        assert_eq!(buffer.push(2.0), Some(1.0));
        assert_eq!(buffer.to_vec(), vec![2.0]);
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut buffer = RingBuffer::new(5);

        let mut evicted = Vec::new();
        for i in 0..10 {
            if let Some(old) = buffer.push(i) {
                evicted.push(old);
            }
        }

        assert_eq!(buffer.len(), 5);
        assert!(buffer.is_full());
        assert_eq!(evicted, vec![0, 1, 2, 3, 4]);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_rms_and_mean() {
        let mut buffer = RingBuffer::new(4);
        for v in [3.0, -3.0, 3.0, -3.0] {
            buffer.push(v);
        }
        assert!((buffer.rms() - 3.0).abs() < 1e-12);
        assert!(buffer.mean().abs() < 1e-12);

        buffer.clear();
        assert_eq!(buffer.rms(), 0.0);
        assert!(buffer.is_empty());
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(capacity in 1usize..64, items in proptest::collection::vec(any::<i32>(), 0..256)) {
            let mut buffer = RingBuffer::new(capacity);
            for item in &items {
                buffer.push(*item);
            }
            prop_assert!(buffer.len() <= capacity);
            prop_assert_eq!(buffer.len(), items.len().min(capacity));
            prop_assert_eq!(buffer.iter().last().copied(), items.last().copied());
        }
    }
}
