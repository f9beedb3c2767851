//! Progress reporting for the long-running, per-time-point scans of the
//! link selector (C8), error detector (C9) and comparison engine (C10),
//! feature-gated behind `pbar`.

use std::fmt::Write;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};

/// Builds an `indicatif::ProgressBar` sized to a known number of time
/// points. Pass `0` if the total isn't known up front; a spinner with no
/// bound is shown instead.
pub fn prepare_time_point_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);

    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(8));

    let template = match len {
        1.. => {
            "{spinner:.green} [{elapsed_precise}] {msg} [{bar:.cyan/blue}] {pos}/{len} ({eta}, {per_sec})"
        }
        0 => "{spinner:.green} [{elapsed_precise}] [ ? ] {msg} ({per_sec})",
    };

    pb.set_style(
        ProgressStyle::with_template(template).unwrap().with_key(
            "eta",
            |state: &ProgressState, w: &mut dyn Write| {
                write!(w, "{:.1}s", state.eta().as_secs_f64()).unwrap()
            },
        ),
    );

    pb
}
