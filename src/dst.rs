//! Daylight-saving aware day classification and timestamp localization.
//!
//! Local dates are classified by their civil length in the feed timezone
//! (23, 24 or 25 hours). Naive local timestamps are then localized with the
//! day map in hand so that the repeated fall-back hour and the skipped
//! spring-forward hour end up as flagged rows instead of errors.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::types::{DstMetrics, Flag, Flags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayType {
    Normal,
    SpringForward,
    FallBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayInfo {
    pub day_type: DayType,
    pub expected_hours: u32,
}

pub type DayInfoMap = BTreeMap<NaiveDate, DayInfo>;

/// First instant of `date` in `tz`. Handles zones whose transition happens at
/// midnight by stepping forward until a valid local time is found.
fn start_of_day(date: NaiveDate, tz: &Tz) -> Option<DateTime<Tz>> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=180)
        .step_by(15)
        .find_map(|m| tz.from_local_datetime(&(midnight + Duration::minutes(m))).earliest())
}

/// Classifies a local date by the civil hours between its midnight and the
/// next one.
///
/// Any span other than 23 or 25 hours is reported as [`DayType::Normal`] with
/// the measured hour count passed through unchanged.
pub fn classify_day(date: NaiveDate, tz: &Tz) -> DayInfo {
    let hours = date
        .succ_opt()
        .and_then(|next| Some((start_of_day(date, tz)?, start_of_day(next, tz)?)))
        .map(|(start, end)| ((end - start).num_seconds() / 3600) as u32)
        .unwrap_or(24);

    let day_type = match hours {
        23 => DayType::SpringForward,
        25 => DayType::FallBack,
        _ => DayType::Normal,
    };

    DayInfo {
        day_type,
        expected_hours: hours,
    }
}

/// Builds the day map for every distinct date in `dates`.
pub fn build_day_info(dates: impl IntoIterator<Item = NaiveDate>, tz: &Tz) -> DayInfoMap {
    let unique: HashSet<NaiveDate> = dates.into_iter().collect();
    unique.into_iter().map(|d| (d, classify_day(d, tz))).collect()
}

pub fn dst_metrics(day_info: &DayInfoMap) -> DstMetrics {
    let count = |t: DayType| day_info.values().filter(|d| d.day_type == t).count();
    let spring_forward_days = count(DayType::SpringForward);
    let fall_back_days = count(DayType::FallBack);

    DstMetrics {
        total_days: day_info.len(),
        normal_days: count(DayType::Normal),
        spring_forward_days,
        fall_back_days,
        dst_days: spring_forward_days + fall_back_days,
    }
}

/// Result of localizing one naive timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Localized {
    pub local: Option<DateTime<Tz>>,
    pub utc: Option<DateTime<Utc>>,
    pub flags: Flags,
}

#[derive(Clone, Copy)]
enum Occurrence {
    Daylight,
    Standard,
}

/// Localizes naive timestamps, grouping repeated values across the whole
/// input. See [`localize_with_dst_scoped`].
pub fn localize_with_dst(
    naive_ts: &[Option<NaiveDateTime>],
    tz: &Tz,
    day_info: &DayInfoMap,
) -> Vec<Localized> {
    localize_with_dst_scoped(naive_ts, None, tz, day_info)
}

/// Localizes naive timestamps into `tz`.
///
/// Rows on a fall-back date whose naive value repeats within the same scope
/// key are disambiguated: a pair resolves first-seen to daylight time and
/// second to standard time, any other group size is left unresolved. With
/// `scopes` of `None` every row shares one scope. Output is parallel to the
/// input; failures become `None` plus a flag.
///
/// `scopes`, when given, must be parallel to `naive_ts`. Debug builds assert
/// this; in release builds rows without a scope key share the empty scope.
pub fn localize_with_dst_scoped(
    naive_ts: &[Option<NaiveDateTime>],
    scopes: Option<&[String]>,
    tz: &Tz,
    day_info: &DayInfoMap,
) -> Vec<Localized> {
    let is_day = |ts: &NaiveDateTime, t: DayType| {
        day_info
            .get(&ts.date())
            .is_some_and(|info| info.day_type == t)
    };
    if let Some(s) = scopes {
        debug_assert_eq!(s.len(), naive_ts.len(), "scope keys must be parallel to timestamps");
    }
    let scope_of = |i: usize| scopes.and_then(|s| s.get(i)).map_or("", String::as_str);

    let mut flags: Vec<Flags> = vec![Flags::new(); naive_ts.len()];
    let mut occurrence: Vec<Option<Occurrence>> = vec![None; naive_ts.len()];
    let mut unresolved: Vec<bool> = vec![false; naive_ts.len()];

    let mut groups: HashMap<(&str, NaiveDateTime), Vec<usize>> = HashMap::new();
    for (i, ts) in naive_ts.iter().enumerate() {
        if let Some(ts) = ts {
            groups.entry((scope_of(i), *ts)).or_default().push(i);
        }
    }

    for ((_, ts), idx) in &groups {
        if idx.len() < 2 || !is_day(ts, DayType::FallBack) {
            continue;
        }
        if let [first, second] = idx.as_slice() {
            occurrence[*first] = Some(Occurrence::Daylight);
            occurrence[*second] = Some(Occurrence::Standard);
            for &i in idx {
                flags[i].insert(Flag::DstFallBackDuplicate);
            }
        } else {
            debug!(timestamp = %ts, group_size = idx.len(), "Fall-back group left unresolved");
            for &i in idx {
                unresolved[i] = true;
                flags[i].insert(Flag::DstFallBackAmbiguous);
            }
        }
    }

    naive_ts
        .iter()
        .enumerate()
        .map(|(i, ts)| {
            let local = ts.filter(|_| !unresolved[i]).and_then(|ts| {
                let mapped = tz.from_local_datetime(&ts);
                match occurrence[i] {
                    Some(Occurrence::Daylight) => mapped.earliest(),
                    Some(Occurrence::Standard) => mapped.latest(),
                    None => mapped.single(),
                }
            });

            let mut row_flags = std::mem::take(&mut flags[i]);
            if local.is_none() && !unresolved[i] {
                match ts {
                    Some(ts) if is_day(ts, DayType::SpringForward) => {
                        row_flags.insert(Flag::DstSpringForwardNonexistent);
                    }
                    _ => {
                        row_flags.insert(Flag::DstLocalizeFailed);
                    }
                }
            }

            Localized {
                local,
                utc: local.map(|t| t.with_timezone(&Utc)),
                flags: row_flags,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Los_Angeles;
    use chrono_tz::Asia::Tokyo;
    use chrono_tz::Europe::London;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ts(s: &str) -> Option<NaiveDateTime> {
        Some(NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap())
    }

    fn day_map(dates: &[&str], tz: &Tz) -> DayInfoMap {
        build_day_info(dates.iter().map(|d| date(d)), tz)
    }

    #[test]
    fn test_classify_day_types() {
        let spring = classify_day(date("2024-03-10"), &Los_Angeles);
        assert_eq!(spring.day_type, DayType::SpringForward);
        assert_eq!(spring.expected_hours, 23);

        let fall = classify_day(date("2024-11-03"), &Los_Angeles);
        assert_eq!(fall.day_type, DayType::FallBack);
        assert_eq!(fall.expected_hours, 25);

        let normal = classify_day(date("2024-07-01"), &Los_Angeles);
        assert_eq!(normal.day_type, DayType::Normal);
        assert_eq!(normal.expected_hours, 24);
    }

    #[test]
    fn test_classify_day_follows_timezone() {
        assert_eq!(classify_day(date("2024-03-31"), &London).expected_hours, 23);
        assert_eq!(classify_day(date("2024-10-27"), &London).expected_hours, 25);
        // US transition dates are ordinary days in London and Tokyo
        assert_eq!(classify_day(date("2024-03-10"), &London).expected_hours, 24);
        assert_eq!(classify_day(date("2024-11-03"), &Tokyo).expected_hours, 24);
    }

    #[test]
    fn test_dst_metrics_counts() {
        let map = day_map(&["2024-03-10", "2024-07-01", "2024-11-03", "2024-11-04"], &Los_Angeles);
        let m = dst_metrics(&map);
        assert_eq!(m.total_days, 4);
        assert_eq!(m.normal_days, 2);
        assert_eq!(m.spring_forward_days, 1);
        assert_eq!(m.fall_back_days, 1);
        assert_eq!(m.dst_days, 2);
    }

    #[test]
    fn test_fall_back_pair_resolves_one_hour_apart() {
        let map = day_map(&["2024-11-03"], &Los_Angeles);
        let input = vec![ts("2024-11-03 00:00"), ts("2024-11-03 01:00"), ts("2024-11-03 01:00")];
        let out = localize_with_dst(&input, &Los_Angeles, &map);

        assert!(out[0].flags.is_empty());
        let first = out[1].utc.unwrap();
        let second = out[2].utc.unwrap();
        assert_eq!(second - first, Duration::hours(1));
        assert!(out[1].flags.contains(&Flag::DstFallBackDuplicate));
        assert!(out[2].flags.contains(&Flag::DstFallBackDuplicate));
        assert_eq!(first.format("%H:%M").to_string(), "08:00");
    }

    #[test]
    fn test_fall_back_group_of_three_is_ambiguous() {
        let map = day_map(&["2024-11-03"], &Los_Angeles);
        let input = vec![ts("2024-11-03 01:00"); 3];
        let out = localize_with_dst(&input, &Los_Angeles, &map);

        for row in &out {
            assert!(row.local.is_none());
            assert!(row.utc.is_none());
            assert!(row.flags.contains(&Flag::DstFallBackAmbiguous));
            assert!(!row.flags.contains(&Flag::DstLocalizeFailed));
        }
    }

    #[test]
    fn test_spring_forward_gap_is_nonexistent() {
        let map = day_map(&["2024-03-10"], &Los_Angeles);
        let input = vec![ts("2024-03-10 01:00"), ts("2024-03-10 02:00"), ts("2024-03-10 03:00")];
        let out = localize_with_dst(&input, &Los_Angeles, &map);

        assert!(out[0].local.is_some());
        assert!(out[1].local.is_none());
        assert!(out[1].flags.contains(&Flag::DstSpringForwardNonexistent));
        assert!(out[2].local.is_some());
        assert_eq!(out[2].utc.unwrap() - out[0].utc.unwrap(), Duration::hours(1));
    }

    #[test]
    fn test_single_ambiguous_time_fails_to_localize() {
        let map = day_map(&["2024-11-03"], &Los_Angeles);
        let out = localize_with_dst(&[ts("2024-11-03 01:00")], &Los_Angeles, &map);

        assert!(out[0].local.is_none());
        assert!(out[0].flags.contains(&Flag::DstLocalizeFailed));
    }

    #[test]
    fn test_missing_naive_timestamp_is_flagged() {
        let map = day_map(&["2024-07-01"], &Los_Angeles);
        let out = localize_with_dst(&[None, ts("2024-07-01 05:00")], &Los_Angeles, &map);

        assert!(out[0].flags.contains(&Flag::DstLocalizeFailed));
        assert!(out[1].flags.is_empty());
        assert_eq!(out.len(), 2);
    }

    // Grouping across the whole feed treats every multi-zone hour on a
    // fall-back date as a duplicate group. With three zones each hour group has
    // three rows, so the whole day ends up unresolved.
    #[test]
    fn test_feed_scope_conflates_zone_repeats_on_fall_back_day() {
        let map = day_map(&["2024-11-03"], &Los_Angeles);
        let input = vec![ts("2024-11-03 05:00"); 3];
        let out = localize_with_dst(&input, &Los_Angeles, &map);
        assert!(out.iter().all(|r| r.flags.contains(&Flag::DstFallBackAmbiguous)));

        let scopes: Vec<String> = vec!["PGE".into(), "SCE".into(), "TOTAL".into()];
        let out = localize_with_dst_scoped(&input, Some(&scopes), &Los_Angeles, &map);
        assert!(out.iter().all(|r| r.local.is_some() && r.flags.is_empty()));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "scope keys must be parallel to timestamps")]
    fn test_scope_keys_length_mismatch_is_rejected() {
        let map = day_map(&["2024-11-03"], &Los_Angeles);
        let input = vec![ts("2024-11-03 01:00"); 2];
        let scopes: Vec<String> = vec!["PGE".into()];
        localize_with_dst_scoped(&input, Some(&scopes), &Los_Angeles, &map);
    }

    #[test]
    fn test_zone_scope_pairs_repeated_hour_per_zone() {
        let map = day_map(&["2024-11-03"], &Los_Angeles);
        let input = vec![
            ts("2024-11-03 01:00"),
            ts("2024-11-03 01:00"),
            ts("2024-11-03 01:00"),
            ts("2024-11-03 01:00"),
        ];
        let scopes: Vec<String> = vec!["A".into(), "B".into(), "A".into(), "B".into()];
        let out = localize_with_dst_scoped(&input, Some(&scopes), &Los_Angeles, &map);

        assert_eq!(out[2].utc.unwrap() - out[0].utc.unwrap(), Duration::hours(1));
        assert_eq!(out[3].utc.unwrap() - out[1].utc.unwrap(), Duration::hours(1));
        assert!(out.iter().all(|r| r.flags.contains(&Flag::DstFallBackDuplicate)));
    }
}
