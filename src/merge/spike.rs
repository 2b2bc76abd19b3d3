use crate::data::series::TimeSeries;
use chrono::NaiveDateTime;

const SECONDS_PER_DAY: f64 = 86_400.0;

//price change between consecutive points scaled to a one day horizon
//(change divided by the square root of elapsed days), indexed by the later point
pub fn average_change_per_day(series: &TimeSeries<f64>) -> TimeSeries<f64> {
    let points = series.points();

    points
        .windows(2)
        .map(|pair| {
            let (earlier, earlier_value) = pair[0];
            let (later, later_value) = pair[1];
            let elapsed_days = (later - earlier).num_seconds() as f64 / SECONDS_PER_DAY;

            (later, (later_value - earlier_value) / elapsed_days.sqrt())
        })
        .collect()
}

//exponentially weighted mean with bias adjustment; a missing observation ages the
//weights without contributing, and output stays nan until the first observation
pub fn exponential_weighted_mean(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let decay = 1.0 - alpha;

    let mut output = Vec::with_capacity(values.len());
    let mut weighted_average = f64::NAN;
    let mut old_weight = 1.0;

    for &value in values {
        let is_observation = !value.is_nan();

        if !weighted_average.is_nan() {
            old_weight *= decay;
            if is_observation {
                if weighted_average != value {
                    weighted_average =
                        (old_weight * weighted_average + value) / (old_weight + 1.0);
                }
                old_weight += 1.0;
            }
        } else if is_observation {
            weighted_average = value;
        }

        output.push(weighted_average);
    }

    output
}

//absolute per day change expressed in units of its own long run average
pub fn change_in_average_units(series: &TimeSeries<f64>, span: usize) -> TimeSeries<f64> {
    let absolute_change = average_change_per_day(series).map(|change| change.abs());
    let average = exponential_weighted_mean(&absolute_change.values(), span);

    absolute_change
        .iter()
        .zip(average)
        .map(|((timestamp, change), average)| (*timestamp, change / average))
        .collect()
}

//first point (at or after `from`, when given) whose move exceeds max_spike average units
pub fn first_spike(
    series: &TimeSeries<f64>,
    from: Option<NaiveDateTime>,
    max_spike: f64,
    span: usize,
) -> Option<(NaiveDateTime, f64)> {
    let change = change_in_average_units(series, span);
    let to_check = match from {
        Some(from) => change.since(from),
        None => change,
    };

    //nan never compares greater so gaps are not spikes
    let spike = to_check
        .iter()
        .find(|(_, magnitude)| *magnitude > max_spike)
        .copied();
    spike
}
