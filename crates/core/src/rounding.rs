use rust_decimal::Decimal;

/// Quantizes `value` to the nearest multiple of `step`, never rounding up.
///
/// Half-way cases round to even first; if the quantized result would
/// exceed `value`, one step is subtracted so the result never overstates
/// an available balance or volume. Steps of one or more additionally
/// truncate to a whole number, since exchanges reject fractional units at
/// that granularity. A non-positive step returns `value` unchanged.
#[must_use]
pub fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    let mut quantized = (value / step).round() * step;
    if quantized > value {
        quantized -= step;
    }
    if step >= Decimal::ONE {
        quantized = quantized.trunc();
    }
    quantized
}
