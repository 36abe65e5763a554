//! Draw strategies.

use crate::error::WatermarkResult;
use crate::surface::Surface;

/// The surface a draw strategy produced.
#[derive(Debug)]
pub enum Composed {
    /// One of the input surfaces, by index, was drawn into in place.
    Source(usize),
    /// A surface the strategy created itself.
    Drawn(Surface),
}

/// Composes the rasterized resources into one image.
///
/// `surfaces` holds one surface per resolved resource, in resource order.
/// Strategies may draw into any of them. The pipeline keeps ownership of the
/// inputs and returns every one of them to the pool afterwards, so a strategy
/// points at an input with [`Composed::Source`] instead of handing it back.
///
/// A panic inside `draw` is caught and reported as a `Draw` error.
pub trait DrawStrategy: Send + Sync {
    fn draw(&self, surfaces: &mut [Surface]) -> WatermarkResult<Composed>;
}

impl<F> DrawStrategy for F
where
    F: Fn(&mut [Surface]) -> WatermarkResult<Composed> + Send + Sync,
{
    fn draw(&self, surfaces: &mut [Surface]) -> WatermarkResult<Composed> {
        self(surfaces)
    }
}

/// Runs several strategies against the same surfaces, in order.
///
/// Every step sees the same surfaces, so marks drawn onto the first surface
/// stack. The last step's result is returned; an empty sequence selects the
/// first surface unchanged.
pub struct Sequence {
    steps: Vec<Box<dyn DrawStrategy>>,
}

impl Sequence {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn then(mut self, step: impl DrawStrategy + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn push(&mut self, step: Box<dyn DrawStrategy>) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawStrategy for Sequence {
    fn draw(&self, surfaces: &mut [Surface]) -> WatermarkResult<Composed> {
        let mut composed = Composed::Source(0);
        for step in &self.steps {
            composed = step.draw(surfaces)?;
        }
        Ok(composed)
    }
}
