//! Shared viewport and callback-payload types, per §3 "Viewport" and §6 "Façade callback
//! payload".

use crate::axis::AxisValue;

/// A half-open axis interval requested by the presentation layer.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub x_start: AxisValue,
    pub x_end: AxisValue,
}

impl Viewport {
    /// An empty viewport (`x_start >= x_end`) normalizes to the full axis range, per §3.
    #[must_use]
    pub fn normalize(self, axis_lo: &AxisValue, axis_hi: &AxisValue) -> Self {
        let empty = matches!(
            self.x_start.partial_cmp(&self.x_end),
            None | Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
        );
        if empty {
            Self {
                x_start: axis_lo.clone(),
                x_end: axis_hi.clone(),
            }
        } else {
            self
        }
    }
}

/// Opaque token returned by `request_viewport`, echoed back in the callback payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(pub u64);

/// One display series for a retained numeric column, per §4.8.
#[derive(Debug, Clone)]
pub struct Trace {
    pub name: String,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub gaps_present: bool,
}

/// Why a pending fetch was discarded instead of delivered, per §6.
#[derive(Debug, Clone)]
pub enum DiscardReason {
    Superseded,
    EpochChanged,
    IoError(String),
}

/// The façade callback payload, per §6.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Delivered {
        token: RequestToken,
        epoch: u64,
        x_start: AxisValue,
        x_end: AxisValue,
        clipped: bool,
        traces: Vec<Trace>,
        total_rows: u64,
        malformed_rows: u64,
    },
    Discarded {
        token: RequestToken,
        epoch: u64,
        reason: DiscardReason,
    },
}
