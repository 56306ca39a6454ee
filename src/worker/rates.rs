//! Prefill and decode token rates for one completed attempt.

use crate::client::Usage;
use std::time::Duration;

/// Token rates derived from an attempt's timings and usage report.
///
/// Each rate is `None` whenever its denominator is unknown or not positive.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedRates {
    pub prefill_tokens_per_second: Option<f64>,
    pub decode_tokens_per_second: Option<f64>,
}

/// Earliest output of either kind, if any arrived.
pub fn first_output_time(ttft: Option<Duration>, ttfr: Option<Duration>) -> Option<Duration> {
    match (ttft, ttfr) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Prefill is attributed to the time until first output; decode to the rest
/// of the attempt.
pub fn derive_rates(
    ttft: Option<Duration>,
    ttfr: Option<Duration>,
    total: Duration,
    usage: &Usage,
) -> DerivedRates {
    let Some(first_output) = first_output_time(ttft, ttfr) else {
        return DerivedRates::default();
    };

    let per_second = |tokens: u64, elapsed: Duration| {
        let seconds = elapsed.as_secs_f64();
        (seconds > 0.0).then(|| tokens as f64 / seconds)
    };

    DerivedRates {
        prefill_tokens_per_second: per_second(usage.prompt_tokens, first_output),
        decode_tokens_per_second: per_second(
            usage.completion_tokens,
            total.saturating_sub(first_output),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u64, completion: u64) -> Usage {
        Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    #[test]
    fn test_rates_split_at_first_output() {
        let rates = derive_rates(
            Some(Duration::from_millis(100)),
            None,
            Duration::from_millis(200),
            &usage(10, 5),
        );
        assert_eq!(rates.prefill_tokens_per_second, Some(100.0));
        assert_eq!(rates.decode_tokens_per_second, Some(50.0));
    }

    #[test]
    fn test_reasoning_counts_as_first_output() {
        let rates = derive_rates(
            Some(Duration::from_millis(400)),
            Some(Duration::from_millis(200)),
            Duration::from_millis(1200),
            &usage(100, 50),
        );
        assert_eq!(rates.prefill_tokens_per_second, Some(500.0));
        assert_eq!(rates.decode_tokens_per_second, Some(50.0));
    }

    #[test]
    fn test_unknown_first_output_leaves_rates_undefined() {
        let rates = derive_rates(None, None, Duration::from_secs(1), &usage(10, 0));
        assert_eq!(rates, DerivedRates::default());
    }

    #[test]
    fn test_zero_durations_leave_rates_undefined() {
        let rates = derive_rates(
            Some(Duration::ZERO),
            None,
            Duration::ZERO,
            &usage(10, 5),
        );
        assert_eq!(rates.prefill_tokens_per_second, None);
        assert_eq!(rates.decode_tokens_per_second, None);

        let rates = derive_rates(
            Some(Duration::from_millis(100)),
            None,
            Duration::from_millis(100),
            &usage(10, 5),
        );
        assert_eq!(rates.prefill_tokens_per_second, Some(100.0));
        assert_eq!(rates.decode_tokens_per_second, None);
    }

    #[test]
    fn test_first_output_time() {
        let ms = Duration::from_millis;
        assert_eq!(first_output_time(Some(ms(3)), Some(ms(2))), Some(ms(2)));
        assert_eq!(first_output_time(None, Some(ms(2))), Some(ms(2)));
        assert_eq!(first_output_time(Some(ms(3)), None), Some(ms(3)));
        assert_eq!(first_output_time(None, None), None);
    }
}
