//! Time placeholders in probe targets.
//!
//! A target may carry `${__from}` and `${__to}` tokens, optionally followed by
//! `:date` and a format:
//!
//! | token | substitution |
//! |-------|--------------|
//! | `${__to}` | now, Unix milliseconds |
//! | `${__from}` | previous probe of this target, Unix milliseconds |
//! | `${__to:date}` / `${__to:date:iso}` | RFC 3339 |
//! | `${__to:date:seconds}` | Unix seconds |
//! | `${__to:date:yyyy-mm-dd}` | custom format |
//!
//! Custom formats use `yyyy yy mmmm mmm mm dddd ddd dd HH HHT MM SS ss tt ZZZ
//! Z o`. Month is lowercase `mm`, minutes uppercase `MM`.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use parking_lot::Mutex;
use regex::{Captures, Regex};
use tracing::{trace, warn};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{__(from|to)(?::(date):?(.*?))?\}").expect("token pattern is valid")
});

/// Custom format tokens, longest first.
const FORMAT_TOKENS: &[(&str, &str)] = &[
    ("yyyy", "%Y"),
    ("yy", "%y"),
    ("mmmm", "%B"),
    ("mmm", "%b"),
    ("mm", "%m"),
    ("dddd", "%A"),
    ("ddd", "%a"),
    ("dd", "%d"),
    ("HHT", "%I"),
    ("HH", "%H"),
    ("MM", "%M"),
    ("SS", "%S"),
    ("ss", "%S"),
    ("tt", "%p"),
    ("ZZZ", "%Z"),
    ("Z", "%Z"),
    ("o", "%:z"),
];

/// Resolves time placeholders and remembers when each target was last probed.
///
/// The history holds one entry per distinct target string and is never
/// pruned.
#[derive(Debug, Default)]
pub struct TargetTemplater {
    history: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl TargetTemplater {
    /// Create a templater with an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `target` against the current time.
    pub fn resolve(&self, target: &str, scrape_interval: Option<Duration>) -> String {
        self.resolve_at(target, scrape_interval, Utc::now())
    }

    /// Resolve `target` as if the current time were `now`, then record `now`
    /// as the last scrape of `target`.
    pub fn resolve_at(
        &self,
        target: &str,
        scrape_interval: Option<Duration>,
        now: DateTime<Utc>,
    ) -> String {
        let mut history = self.history.lock();

        let from = match history.get(target) {
            Some(last) => *last,
            None => first_from(now, scrape_interval),
        };

        let resolved = TOKEN
            .replace_all(target, |caps: &Captures| {
                let time = if &caps[1] == "from" { from } else { now };
                let format = caps.get(3).map_or("", |m| m.as_str());
                substitute(time, caps.get(2).is_some(), format)
            })
            .into_owned();

        history.insert(target.to_string(), now);
        trace!(original = target, resolved = %resolved, "Resolved target");
        resolved
    }

    /// When `target` was last resolved.
    pub fn last_scrape(&self, target: &str) -> Option<DateTime<Utc>> {
        self.history.lock().get(target).copied()
    }

    /// Number of distinct targets seen.
    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    /// Whether no target has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }
}

fn first_from(now: DateTime<Utc>, scrape_interval: Option<Duration>) -> DateTime<Utc> {
    scrape_interval
        .filter(|interval| !interval.is_zero())
        .and_then(|interval| TimeDelta::from_std(interval).ok())
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn substitute(time: DateTime<Utc>, date: bool, format: &str) -> String {
    if !date {
        return time.timestamp_millis().to_string();
    }

    match format {
        "" | "iso" => time.to_rfc3339_opts(SecondsFormat::Secs, true),
        "seconds" => time.timestamp().to_string(),
        custom => {
            let mut out = String::new();
            match write!(out, "{}", time.format(&to_strftime(custom))) {
                Ok(()) => out,
                Err(_) => {
                    warn!(format = custom, "Unsupported date format, using RFC 3339");
                    time.to_rfc3339_opts(SecondsFormat::Secs, true)
                }
            }
        }
    }
}

/// Translate a custom date format into a `chrono` strftime string.
fn to_strftime(format: &str) -> String {
    let mut out = String::with_capacity(format.len() * 2);
    let mut rest = format;

    'outer: while !rest.is_empty() {
        for (token, spec) in FORMAT_TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = tail;
                continue 'outer;
            }
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
        rest = chars.as_str();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_first_from_is_epoch_without_interval() {
        let templater = TargetTemplater::new();
        let resolved = templater.resolve_at("http://x/?from=${__from}", None, at(1_000));
        assert_eq!(resolved, "http://x/?from=0");
    }

    #[test]
    fn test_first_from_uses_interval() {
        let templater = TargetTemplater::new();
        let resolved = templater.resolve_at(
            "http://x/?from=${__from:date:seconds}",
            Some(Duration::from_secs(60)),
            at(1_000),
        );
        assert_eq!(resolved, "http://x/?from=940");
    }

    #[test]
    fn test_zero_interval_behaves_as_unset() {
        let templater = TargetTemplater::new();
        let resolved = templater.resolve_at("${__from}", Some(Duration::ZERO), at(1_000));
        assert_eq!(resolved, "0");
    }

    #[test]
    fn test_later_from_is_previous_now() {
        let templater = TargetTemplater::new();
        let target = "http://x/?from=${__from}&to=${__to}";

        let first = templater.resolve_at(target, None, at(1_000));
        assert_eq!(first, "http://x/?from=0&to=1000000");

        let second = templater.resolve_at(target, None, at(1_060));
        assert_eq!(second, "http://x/?from=1000000&to=1060000");
        assert_eq!(templater.last_scrape(target), Some(at(1_060)));
    }

    #[test]
    fn test_history_is_per_target() {
        let templater = TargetTemplater::new();
        templater.resolve_at("a=${__from}", None, at(10));

        assert_eq!(templater.resolve_at("b=${__from}", None, at(20)), "b=0");
        assert_eq!(templater.resolve_at("a=${__from}", None, at(30)), "a=10000");
        assert_eq!(templater.len(), 2);
    }

    #[test]
    fn test_targets_without_tokens_are_recorded() {
        let templater = TargetTemplater::new();
        assert!(templater.is_empty());
        assert_eq!(templater.resolve_at("http://plain", None, at(5)), "http://plain");
        assert_eq!(templater.last_scrape("http://plain"), Some(at(5)));
    }

    #[test]
    fn test_date_formats() {
        let templater = TargetTemplater::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        assert_eq!(
            templater.resolve_at("${__to:date}", None, now),
            "2024-03-09T14:05:07Z"
        );
        assert_eq!(
            templater.resolve_at("${__to:date:iso}", None, now),
            "2024-03-09T14:05:07Z"
        );
        assert_eq!(
            templater.resolve_at("${__to:date:seconds}", None, now),
            now.timestamp().to_string()
        );
        assert_eq!(
            templater.resolve_at("${__to:date:yyyy-mm-dd HH:MM:SS}", None, now),
            "2024-03-09 14:05:07"
        );
    }

    #[test]
    fn test_repeated_token_replaced_everywhere() {
        let templater = TargetTemplater::new();
        let resolved = templater.resolve_at("${__to}-${__to}", None, at(2));
        assert_eq!(resolved, "2000-2000");
    }

    #[test]
    fn test_to_strftime() {
        assert_eq!(to_strftime("yyyy-mm-dd"), "%Y-%m-%d");
        assert_eq!(to_strftime("dddd, dd mmmm yy"), "%A, %d %B %y");
        assert_eq!(to_strftime("HHT:MM tt"), "%I:%M %p");
        assert_eq!(to_strftime("100%"), "100%%");
    }

    #[test]
    fn test_concurrent_resolves() {
        use std::sync::Arc;

        let templater = Arc::new(TargetTemplater::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let templater = templater.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        templater.resolve(&format!("t{}-{}=${{__from}}", i, j % 10), None);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(templater.len(), 80);
    }
}
