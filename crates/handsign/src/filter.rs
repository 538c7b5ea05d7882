//! Data filtering and smoothing.
//!
//! Filters are stateless configuration objects; the state they accumulate lives in a separate
//! [`Filter::State`] value. This lets one filter configuration drive many independent streams,
//! such as one per tracker feature and class.

/// A filter for values of type `V`.
pub trait Filter<V> {
    /// Accumulated state of a single filtered stream.
    type State: Default;

    /// Adds a new value to the stream described by `state`, returning the filtered value.
    fn filter(&self, state: &mut Self::State, value: V) -> V;
}

/// An Exponential Moving Average (EMA) filter.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f32,
}

impl Ema {
    /// Creates a new Exponential Moving Average filter.
    ///
    /// `alpha` is the weight given to each new value and must be between 0.0 and 1.0. The first
    /// value pushed into a fresh [`EmaState`] is returned unchanged.
    ///
    /// # Panics
    ///
    /// This method will panic if `alpha` is not in between 0.0 and 1.0.
    pub fn new(alpha: f32) -> Self {
        assert!(
            (0.0..=1.0).contains(&alpha),
            "EMA alpha must be in range 0..=1, got {alpha}"
        );
        Self { alpha }
    }
}

/// Filter state for [`Ema`] filters.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmaState {
    last: Option<f32>,
}

impl EmaState {
    /// Returns the most recent filtered value, or [`None`] if no value was pushed yet.
    pub fn value(&self) -> Option<f32> {
        self.last
    }
}

impl Filter<f32> for Ema {
    type State = EmaState;

    fn filter(&self, state: &mut EmaState, value: f32) -> f32 {
        let avg = match state.last {
            Some(last) => self.alpha * value + (1.0 - self.alpha) * last,
            None => value,
        };
        state.last = Some(avg);
        avg
    }
}
