use rand::Rng;

use super::filters::find_filter;
use super::ReadingSource;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Draw a simulated reading for `filter_id`.
///
/// Catalog filters sample their closed range uniformly; anything else yields a
/// value in `[0, 1)`. Results carry two decimal places.
pub fn generate<R: Rng + ?Sized>(filter_id: &str, rng: &mut R) -> f64 {
    match find_filter(filter_id) {
        Some(filter) => round2(rng.gen_range(filter.min..=filter.max)),
        None => (rng.gen::<f64>() * 100.0).floor() / 100.0,
    }
}

/// Reading source backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockGenerator;

impl ReadingSource for MockGenerator {
    fn read(&self, filter_id: &str) -> f64 {
        generate(filter_id, &mut rand::thread_rng())
    }
}
