use std::thread;
use std::time::Duration;
use crate::drivers::AdcError;
/// Moving-average ring buffer over raw ADC samples.
///
/// Holds `readings_per_cycle * averaging_window` samples. The first read cycle
/// fills every slot (`warm_up`); later cycles replace only `readings_per_cycle`
/// of the oldest samples (`update`). The running sum always equals the sum of
/// the slots.
#[derive(Clone, Debug)]
pub struct AveragingBuffer {
    samples: Vec<i32>,
    sum: i64,
    cursor: usize,
    readings_per_cycle: usize,
    ready: bool,
}
impl AveragingBuffer {
    pub fn new(readings_per_cycle: usize, averaging_window: usize) -> Result<Self, AdcError> {
        let capacity = readings_per_cycle
            .checked_mul(averaging_window)
            .filter(|&c| c > 0)
            .ok_or_else(|| {
                AdcError::InvalidConfig(format!(
                    "averaging buffer of {readings_per_cycle} readings x {averaging_window} window is empty"
                ))
            })?;
        Ok(Self {
            samples: vec![0; capacity],
            sum: 0,
            cursor: 0,
            readings_per_cycle,
            ready: false,
        })
    }
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }
    pub fn readings_per_cycle(&self) -> usize {
        self.readings_per_cycle
    }
    pub fn is_ready(&self) -> bool {
        self.ready
    }
    pub fn sum(&self) -> i64 {
        self.sum
    }
    /// Fills the whole buffer from `sample`. Does nothing once the buffer is ready.
    ///
    /// A failed sample leaves the buffer not ready; the next call starts over.
    pub fn warm_up<F>(&mut self, mut sample: F) -> Result<(), AdcError>
    where
        F: FnMut() -> Result<i32, AdcError>,
    {
        if self.ready {
            return Ok(());
        }
        self.samples.iter_mut().for_each(|slot| *slot = 0);
        self.sum = 0;
        self.cursor = 0;
        for i in 0..self.samples.len() {
            let value = sample()?;
            self.samples[i] = value;
            self.sum += i64::from(value);
        }
        self.ready = true;
        Ok(())
    }
    /// Replaces the `readings_per_cycle` oldest samples, sleeping `delay`
    /// after each one so the input can settle.
    pub fn update<F>(&mut self, mut sample: F, delay: Duration) -> Result<(), AdcError>
    where
        F: FnMut() -> Result<i32, AdcError>,
    {
        for _ in 0..self.readings_per_cycle {
            let value = sample()?;
            self.sum -= i64::from(self.samples[self.cursor]);
            self.samples[self.cursor] = value;
            self.cursor = (self.cursor + 1) % self.samples.len();
            self.sum += i64::from(value);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
        Ok(())
    }
    /// Warm-up on first use, update afterwards.
    pub fn refresh<F>(&mut self, sample: F, delay: Duration) -> Result<(), AdcError>
    where
        F: FnMut() -> Result<i32, AdcError>,
    {
        if self.ready {
            self.update(sample, delay)
        } else {
            self.warm_up(sample)
        }
    }
    /// Mean of the buffer rounded to the nearest integer. Only meaningful once ready.
    pub fn average(&self) -> i32 {
        (self.sum as f64 / self.samples.len() as f64).round() as i32
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn constant(v: i32) -> impl FnMut() -> Result<i32, AdcError> {
        move || Ok(v)
    }
    fn slot_sum(buffer: &AveragingBuffer) -> i64 {
        buffer.samples.iter().map(|&v| i64::from(v)).sum()
    }
    #[test]
    fn capacity_is_readings_times_window() {
        let buffer = AveragingBuffer::new(4, 3).unwrap();
        assert_eq!(buffer.capacity(), 12);
        assert!(!buffer.is_ready());
        assert!(matches!(
            AveragingBuffer::new(0, 10),
            Err(AdcError::InvalidConfig(_))
        ));
        assert!(AveragingBuffer::new(10, 0).is_err());
    }
    #[test]
    fn warm_up_draws_full_capacity_once() {
        let mut buffer = AveragingBuffer::new(2, 5).unwrap();
        let mut calls = 0;
        buffer
            .warm_up(|| {
                calls += 1;
                Ok(700)
            })
            .unwrap();
        assert_eq!(calls, 10);
        assert!(buffer.is_ready());
        assert_eq!(buffer.average(), 700);
        buffer
            .warm_up(|| {
                calls += 1;
                Ok(0)
            })
            .unwrap();
        assert_eq!(calls, 10);
        assert_eq!(buffer.sum(), slot_sum(&buffer));
    }
    #[test]
    fn update_draws_readings_per_cycle() {
        let mut buffer = AveragingBuffer::new(3, 4).unwrap();
        buffer.warm_up(constant(100)).unwrap();
        let mut calls = 0;
        buffer
            .update(
                || {
                    calls += 1;
                    Ok(200)
                },
                Duration::ZERO,
            )
            .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(buffer.sum(), 9 * 100 + 3 * 200);
        assert_eq!(buffer.sum(), slot_sum(&buffer));
        assert_eq!(buffer.average(), 125);
    }
    #[test]
    fn moving_average_converges_to_new_level() {
        let mut buffer = AveragingBuffer::new(5, 4).unwrap();
        buffer.refresh(constant(1234), Duration::ZERO).unwrap();
        assert_eq!(buffer.average(), 1234);
        for _ in 0..4 {
            assert_ne!(buffer.average(), 42);
            buffer.refresh(constant(42), Duration::ZERO).unwrap();
            assert_eq!(buffer.sum(), slot_sum(&buffer));
        }
        assert_eq!(buffer.average(), 42);
    }
    #[test]
    fn average_rounds_to_nearest() {
        let mut buffer = AveragingBuffer::new(1, 2).unwrap();
        let mut values = [10, 11].into_iter();
        buffer.warm_up(|| Ok(values.next().unwrap())).unwrap();
        assert_eq!(buffer.average(), 11);
        let mut buffer = AveragingBuffer::new(1, 3).unwrap();
        let mut values = [10, 10, 11].into_iter();
        buffer.warm_up(|| Ok(values.next().unwrap())).unwrap();
        assert_eq!(buffer.average(), 10);
    }
    #[test]
    fn failed_warm_up_stays_not_ready() {
        let mut buffer = AveragingBuffer::new(2, 2).unwrap();
        let mut calls = 0;
        let result = buffer.warm_up(|| {
            calls += 1;
            if calls == 3 {
                Err(AdcError::InvalidConfig("boom".into()))
            } else {
                Ok(5)
            }
        });
        assert!(result.is_err());
        assert!(!buffer.is_ready());
        buffer.warm_up(constant(8)).unwrap();
        assert_eq!(buffer.average(), 8);
        assert_eq!(buffer.sum(), 32);
    }
}
