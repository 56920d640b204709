//   Copyright (c) 2024-2026 Anton Kundenko <singaraiona@gmail.com>
//   All rights reserved.
//
//   Permission is hereby granted, free of charge, to any person obtaining a copy
//   of this software and associated documentation files (the "Software"), to deal
//   in the Software without restriction, including without limitation the rights
//   to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//   copies of the Software, and to permit persons to whom the Software is
//   furnished to do so, subject to the following conditions:
//
//   The above copyright notice and this permission notice shall be included in all
//   copies or substantial portions of the Software.
//
//   THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//   IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//   FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//   AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//   LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//   OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//   SOFTWARE.

//! EXTRACT / DATE_TRUNC (spec.md §4.13). Timestamps are nanoseconds since
//! the Unix epoch; dates are days since the epoch. Civil calendar math
//! follows Howard Hinnant's `days_from_civil`/`civil_from_days`, which is
//! exact over the full `i32` day range without floating point.

const NS_PER_SEC: i64 = 1_000_000_000;
const SEC_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    DayOfWeek,
    DayOfYear,
}

struct Civil {
    year: i64,
    month: u32,
    day: u32,
}

/// Days since 1970-01-01 -> proleptic Gregorian (y, m, d). `z` may be
/// negative (pre-epoch).
fn civil_from_days(z: i64) -> Civil {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    Civil { year: y, month: m, day: d }
}

fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let mp = if m > 2 { m - 3 } else { m + 9 } as u64;
    let doy = (153 * mp + 2) / 5 + d as u64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe as i64 - 719_468
}

/// `0` = Thursday (1970-01-01), matching `days_from_civil`'s epoch.
fn weekday_from_days(z: i64) -> u32 {
    (if z >= -4 { (z + 4) % 7 } else { (z + 5) % 7 + 6 }) as u32
}

fn day_of_year(y: i64, m: u32, d: u32) -> u32 {
    (days_from_civil(y, m, d) - days_from_civil(y, 1, 1) + 1) as u32
}

struct BrokenDown {
    civil: Civil,
    hour: u32,
    minute: u32,
    second: u32,
}

fn break_down_ns(ts_ns: i64) -> BrokenDown {
    let day = ts_ns.div_euclid(NS_PER_SEC * SEC_PER_DAY);
    let ns_in_day = ts_ns.rem_euclid(NS_PER_SEC * SEC_PER_DAY);
    let secs_in_day = ns_in_day / NS_PER_SEC;
    BrokenDown {
        civil: civil_from_days(day),
        hour: (secs_in_day / 3600) as u32,
        minute: ((secs_in_day / 60) % 60) as u32,
        second: (secs_in_day % 60) as u32,
    }
}

/// `extract(part, ts_ns)`: pull one calendar field out of a nanosecond
/// timestamp.
pub fn extract(part: DatePart, ts_ns: i64) -> i64 {
    let bd = break_down_ns(ts_ns);
    match part {
        DatePart::Year => bd.civil.year,
        DatePart::Month => bd.civil.month as i64,
        DatePart::Day => bd.civil.day as i64,
        DatePart::Hour => bd.hour as i64,
        DatePart::Minute => bd.minute as i64,
        DatePart::Second => bd.second as i64,
        DatePart::DayOfWeek => {
            let day = ts_ns.div_euclid(NS_PER_SEC * SEC_PER_DAY);
            weekday_from_days(day) as i64
        }
        DatePart::DayOfYear => day_of_year(bd.civil.year, bd.civil.month, bd.civil.day) as i64,
    }
}

/// `date_trunc(part, ts_ns)`: truncate a nanosecond timestamp down to the
/// start of the unit named by `part`. `DayOfWeek`/`DayOfYear` are not valid
/// truncation units and truncate to `Day` (the executor only ever compiles
/// the accepted subset; this is a defensive fallback, not a validated path).
pub fn date_trunc(part: DatePart, ts_ns: i64) -> i64 {
    let bd = break_down_ns(ts_ns);
    let day_start = |y: i64, m: u32, d: u32| days_from_civil(y, m, d) * SEC_PER_DAY * NS_PER_SEC;
    match part {
        DatePart::Year => day_start(bd.civil.year, 1, 1),
        DatePart::Month => day_start(bd.civil.year, bd.civil.month, 1),
        DatePart::Day | DatePart::DayOfWeek | DatePart::DayOfYear => {
            day_start(bd.civil.year, bd.civil.month, bd.civil.day)
        }
        DatePart::Hour => {
            day_start(bd.civil.year, bd.civil.month, bd.civil.day) + bd.hour as i64 * 3600 * NS_PER_SEC
        }
        DatePart::Minute => {
            day_start(bd.civil.year, bd.civil.month, bd.civil.day)
                + bd.hour as i64 * 3600 * NS_PER_SEC
                + bd.minute as i64 * 60 * NS_PER_SEC
        }
        DatePart::Second => {
            day_start(bd.civil.year, bd.civil.month, bd.civil.day)
                + bd.hour as i64 * 3600 * NS_PER_SEC
                + bd.minute as i64 * 60 * NS_PER_SEC
                + bd.second as i64 * NS_PER_SEC
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_epoch() {
        let c = civil_from_days(0);
        assert_eq!((c.year, c.month, c.day), (1970, 1, 1));
        assert_eq!(days_from_civil(1970, 1, 1), 0);
    }

    #[test]
    fn roundtrips_arbitrary_date() {
        let z = days_from_civil(2024, 2, 29);
        let c = civil_from_days(z);
        assert_eq!((c.year, c.month, c.day), (2024, 2, 29));
    }

    #[test]
    fn extract_pulls_fields() {
        let ts = days_from_civil(2024, 3, 15) * SEC_PER_DAY * NS_PER_SEC
            + 13 * 3600 * NS_PER_SEC
            + 45 * 60 * NS_PER_SEC
            + 9 * NS_PER_SEC;
        assert_eq!(extract(DatePart::Year, ts), 2024);
        assert_eq!(extract(DatePart::Month, ts), 3);
        assert_eq!(extract(DatePart::Day, ts), 15);
        assert_eq!(extract(DatePart::Hour, ts), 13);
        assert_eq!(extract(DatePart::Minute, ts), 45);
        assert_eq!(extract(DatePart::Second, ts), 9);
    }

    #[test]
    fn date_trunc_to_day_zeroes_time() {
        let ts = days_from_civil(2024, 3, 15) * SEC_PER_DAY * NS_PER_SEC + 12345;
        let truncated = date_trunc(DatePart::Day, ts);
        assert_eq!(truncated, days_from_civil(2024, 3, 15) * SEC_PER_DAY * NS_PER_SEC);
    }

    #[test]
    fn weekday_matches_known_thursday() {
        assert_eq!(weekday_from_days(0), 4);
    }
}
