//! Service Bus management.
//!
//! The administration endpoint is an ATOM feed over HTTPS: every entity is
//! an `<entry>` whose `<content>` wraps a `QueueDescription` (or topic,
//! subscription, ...) in the Service Bus "connect" namespace.

pub mod admin;

pub use admin::{
    QueueOptions, QueueProperties, QueueRuntimeProperties, ServiceBusAdministrationClient,
};

use chrono::Duration as ChronoDuration;

use crate::errors::{Error, Result};

/// Parse an ISO 8601 duration (`P1DT2H`, `PT30S`, `P10675199DT2H48M5.4775807S`).
/// Years and months are not accepted.
pub fn parse_duration(input: &str) -> Result<ChronoDuration> {
    let invalid = || Error::decode(format!("invalid ISO 8601 duration '{}'", input));
    let rest = input.trim().strip_prefix('P').ok_or_else(invalid)?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut total = ChronoDuration::zero();
    let mut number = String::new();
    for c in date_part.chars() {
        match c {
            '0'..='9' => number.push(c),
            'W' | 'D' => {
                let n: i64 = number.parse().map_err(|_| invalid())?;
                let days = if c == 'W' { n * 7 } else { n };
                total = total + ChronoDuration::days(days);
                number.clear();
            }
            _ => return Err(invalid()),
        }
    }
    if !number.is_empty() {
        return Err(invalid());
    }

    if let Some(time_part) = time_part {
        for c in time_part.chars() {
            match c {
                '0'..='9' | '.' => number.push(c),
                'H' | 'M' => {
                    let n: i64 = number.parse().map_err(|_| invalid())?;
                    total = total
                        + if c == 'H' {
                            ChronoDuration::hours(n)
                        } else {
                            ChronoDuration::minutes(n)
                        };
                    number.clear();
                }
                'S' => {
                    let (whole, frac) = number.split_once('.').unwrap_or((number.as_str(), ""));
                    let secs: i64 = whole.parse().map_err(|_| invalid())?;
                    let mut nanos = 0i64;
                    if !frac.is_empty() {
                        let digits: String = frac.chars().take(9).collect();
                        let scale = 10i64.pow(9 - digits.len() as u32);
                        nanos = digits.parse::<i64>().map_err(|_| invalid())? * scale;
                    }
                    total = total + ChronoDuration::seconds(secs) + ChronoDuration::nanoseconds(nanos);
                    number.clear();
                }
                _ => return Err(invalid()),
            }
        }
        if !number.is_empty() {
            return Err(invalid());
        }
    }
    Ok(total)
}

/// Render a duration as `P{d}DT{h}H{m}M{s}S`, omitting zero components.
pub fn format_duration(duration: ChronoDuration) -> String {
    let days = duration.num_days();
    let mut rest = duration - ChronoDuration::days(days);
    let hours = rest.num_hours();
    rest = rest - ChronoDuration::hours(hours);
    let minutes = rest.num_minutes();
    rest = rest - ChronoDuration::minutes(minutes);
    let seconds = rest.num_seconds();
    let nanos = (rest - ChronoDuration::seconds(seconds))
        .num_nanoseconds()
        .unwrap_or(0);

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    if hours == 0 && minutes == 0 && seconds == 0 && nanos == 0 {
        if days == 0 {
            out.push_str("T0S");
        }
        return out;
    }
    out.push('T');
    if hours > 0 {
        out.push_str(&format!("{}H", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}M", minutes));
    }
    if seconds > 0 || nanos > 0 {
        if nanos > 0 {
            let frac = format!("{:09}", nanos);
            out.push_str(&format!("{}.{}S", seconds, frac.trim_end_matches('0')));
        } else {
            out.push_str(&format!("{}S", seconds));
        }
    }
    out
}
