//! Loss normalizer selection

use crate::config::NormalizationMode;

/// Divisor applied to the summed loss and to the gradient
///
/// `valid_count` is the number of positions that were not ignored, or
/// `None` when it was not tracked (every position counts as valid).
///
/// | mode         | divisor                                   |
/// |--------------|-------------------------------------------|
/// | `Full`       | `outer_num * inner_num`                   |
/// | `Valid`      | `valid_count`, else `outer_num * inner_num` |
/// | `BatchSize`  | `outer_num`                               |
/// | `None`       | `1`                                       |
///
/// The result is never below 1, so a batch where every position carries
/// the ignore label yields a zero loss instead of NaN.
pub fn normalizer(
    mode: NormalizationMode,
    outer_num: usize,
    inner_num: usize,
    valid_count: Option<usize>,
) -> f32 {
    let normalizer = match mode {
        NormalizationMode::Full => (outer_num * inner_num) as f32,
        NormalizationMode::Valid => valid_count.unwrap_or(outer_num * inner_num) as f32,
        NormalizationMode::BatchSize => outer_num as f32,
        NormalizationMode::None => 1.0,
    };
    normalizer.max(1.0)
}
