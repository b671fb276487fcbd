/// Window queries over the focus history for the analytics views
use serde::Serialize;
use std::collections::HashMap;

use crate::domain::top_domains;
use crate::focus_data::{DAY_MS, FocusHistory, FocusStats};

/// Focus time within one UTC day
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    /// Epoch-ms of the day's start
    pub timestamp: u64,
    pub domains: HashMap<String, u64>,
    pub total_time: u64,
    pub session_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSummary {
    pub total_tracked_time: u64,
    pub total_domains: usize,
    pub total_sessions: usize,
    pub first_recorded_session: Option<u64>,
    pub last_recorded_session: Option<u64>,
}

/// Everything the analytics page asks for in one reply
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub summary: TrackingSummary,
    pub window_totals: HashMap<String, u64>,
    pub top_domains: Vec<(String, u64)>,
    pub daily: Vec<DaySummary>,
}

/// Per-domain time recorded at or after `since`
pub fn totals_since(history: &FocusHistory, since: u64) -> HashMap<String, u64> {
    history
        .iter()
        .filter_map(|(domain, sessions)| {
            let total: u64 = sessions
                .iter()
                .filter(|s| s.timestamp >= since)
                .map(|s| s.duration)
                .sum();
            (total > 0).then(|| (domain.clone(), total))
        })
        .collect()
}

/// One bucket per UTC day for the last `days` days, oldest first, today last
pub fn daily_breakdown(history: &FocusHistory, now: u64, days: u32) -> Vec<DaySummary> {
    let today = start_of_day(now);

    (0..u64::from(days))
        .rev()
        .filter_map(|offset| today.checked_sub(offset * DAY_MS))
        .map(|day_start| {
            let day_range = day_start..day_start + DAY_MS;
            let mut day = DaySummary {
                timestamp: day_start,
                domains: HashMap::new(),
                total_time: 0,
                session_count: 0,
            };

            for (domain, sessions) in history.iter() {
                let in_day = sessions.iter().filter(|s| day_range.contains(&s.timestamp));
                for session in in_day {
                    *day.domains.entry(domain.clone()).or_insert(0) += session.duration;
                    day.total_time += session.duration;
                    day.session_count += 1;
                }
            }

            day
        })
        .collect()
}

pub fn summary(stats: &FocusStats, history: &FocusHistory) -> TrackingSummary {
    let timestamps =
        || history.iter().flat_map(|(_, sessions)| sessions.iter().map(|s| s.timestamp));

    TrackingSummary {
        total_tracked_time: stats.total(),
        total_domains: stats.len(),
        total_sessions: history.session_count(),
        first_recorded_session: timestamps().min(),
        last_recorded_session: timestamps().max(),
    }
}

/// Summary, last-`days` totals, top ten domains in that window, and daily buckets
pub fn report(stats: &FocusStats, history: &FocusHistory, now: u64, days: u32) -> AnalyticsReport {
    let since = now.saturating_sub(u64::from(days) * DAY_MS);
    let window_totals = totals_since(history, since);

    AnalyticsReport {
        summary: summary(stats, history),
        top_domains: top_domains(&window_totals, 10),
        window_totals,
        daily: daily_breakdown(history, now, days),
    }
}

fn start_of_day(timestamp: u64) -> u64 {
    timestamp - timestamp % DAY_MS
}
