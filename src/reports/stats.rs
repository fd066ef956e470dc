use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::period::PeriodKey;
use crate::core::shared::enums::{TicketPriority, TicketStatus, TicketType};
use crate::tickets::Ticket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCause {
    Development,
    Requirements,
    Infrastructure,
    UserRequest,
}

impl RootCause {
    pub const ALL: [RootCause; 4] = [
        Self::Development,
        Self::Requirements,
        Self::Infrastructure,
        Self::UserRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Requirements => "requirements",
            Self::Infrastructure => "infrastructure",
            Self::UserRequest => "user_request",
        }
    }
}

impl From<TicketType> for RootCause {
    fn from(ticket_type: TicketType) -> Self {
        match ticket_type {
            TicketType::Bug => Self::Development,
            TicketType::Feature | TicketType::Improvement => Self::Requirements,
            TicketType::Incident => Self::Infrastructure,
            TicketType::Support | TicketType::Question => Self::UserRequest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub label: String,
    pub created: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub period: String,
    pub total: usize,
    pub resolved: usize,
    /// Percent change in created tickets; `None` when the previous period was empty.
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketStats {
    pub period: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_root_cause: BTreeMap<String, usize>,
    pub resolved: usize,
    pub open_backlog: usize,
    pub avg_resolution_hours: Option<f64>,
    pub series: Vec<SeriesPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Comparison>,
}

fn zeroed<'a>(keys: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    keys.map(|k| (k.to_string(), 0)).collect()
}

fn bump(map: &mut BTreeMap<String, usize>, key: &str) {
    *map.entry(key.to_string()).or_insert(0) += 1;
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Reduces the tickets created inside `period` into one statistics record.
///
/// Tickets outside the period are ignored. `resolved` counts tickets whose
/// `resolved_at` also falls inside the period; `open_backlog` counts those still
/// unresolved at the period end.
pub fn compute_stats(period: &PeriodKey, tickets: &[Ticket]) -> TicketStats {
    let (start, end) = period.range();
    let buckets = period.buckets();

    let mut stats = TicketStats {
        period: period.to_string(),
        start,
        end,
        total: 0,
        by_status: zeroed(TicketStatus::ALL.iter().map(|s| s.as_str())),
        by_priority: zeroed(TicketPriority::ALL.iter().map(|p| p.as_str())),
        by_type: zeroed(TicketType::ALL.iter().map(|t| t.as_str())),
        by_root_cause: zeroed(RootCause::ALL.iter().map(|r| r.as_str())),
        resolved: 0,
        open_backlog: 0,
        avg_resolution_hours: None,
        series: buckets
            .iter()
            .map(|b| SeriesPoint {
                label: b.label.clone(),
                created: 0,
                resolved: 0,
            })
            .collect(),
        previous: None,
    };

    let mut resolution_hours = 0.0;
    for ticket in tickets.iter().filter(|t| period.contains(t.created_at)) {
        stats.total += 1;
        bump(&mut stats.by_status, ticket.status.as_str());
        bump(&mut stats.by_priority, ticket.priority.as_str());
        bump(&mut stats.by_type, ticket.ticket_type.as_str());
        bump(&mut stats.by_root_cause, RootCause::from(ticket.ticket_type).as_str());

        if let Some(index) = buckets
            .iter()
            .position(|b| ticket.created_at >= b.start && ticket.created_at < b.end)
        {
            stats.series[index].created += 1;
        }

        match ticket.resolved_at {
            Some(resolved_at) if resolved_at < end => {
                stats.resolved += 1;
                resolution_hours +=
                    (resolved_at - ticket.created_at).num_seconds().max(0) as f64 / 3600.0;
                if let Some(index) = buckets
                    .iter()
                    .position(|b| resolved_at >= b.start && resolved_at < b.end)
                {
                    stats.series[index].resolved += 1;
                }
            }
            _ => stats.open_backlog += 1,
        }
    }

    if stats.resolved > 0 {
        stats.avg_resolution_hours = Some(round2(resolution_hours / stats.resolved as f64));
    }
    stats
}

/// Attaches the previous period's totals to `current`.
pub fn compare(mut current: TicketStats, previous: &TicketStats) -> TicketStats {
    let change_pct = (previous.total > 0).then(|| {
        round2((current.total as f64 - previous.total as f64) * 100.0 / previous.total as f64)
    });
    current.previous = Some(Comparison {
        period: previous.period.clone(),
        total: previous.total,
        resolved: previous.resolved,
        change_pct,
    });
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::enums::TicketStage;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn ticket(
        ticket_type: TicketType,
        status: TicketStatus,
        created_at: DateTime<Utc>,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            title: "t".into(),
            description: None,
            status,
            priority: TicketPriority::Medium,
            ticket_type,
            stage: TicketStage::Backlog,
            position: 0,
            creator_id: Some(Uuid::new_v4()),
            assignee_id: None,
            due_date: None,
            resolved_at,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_root_cause_table() {
        assert_eq!(RootCause::from(TicketType::Bug), RootCause::Development);
        assert_eq!(RootCause::from(TicketType::Feature), RootCause::Requirements);
        assert_eq!(RootCause::from(TicketType::Improvement), RootCause::Requirements);
        assert_eq!(RootCause::from(TicketType::Incident), RootCause::Infrastructure);
        assert_eq!(RootCause::from(TicketType::Support), RootCause::UserRequest);
        assert_eq!(RootCause::from(TicketType::Question), RootCause::UserRequest);
    }

    #[test]
    fn test_weekly_rollup() {
        // 2024-W10 runs Mon 4 March .. Mon 11 March
        let period: PeriodKey = "2024-W10".parse().unwrap();
        let monday = at(2024, 3, 4, 9);
        let tickets = vec![
            ticket(TicketType::Bug, TicketStatus::Resolved, monday, Some(monday + Duration::hours(6))),
            ticket(TicketType::Incident, TicketStatus::Closed, monday, Some(at(2024, 3, 6, 9))),
            ticket(TicketType::Question, TicketStatus::Open, at(2024, 3, 8, 12), None),
            // resolved only after the period ended
            ticket(TicketType::Feature, TicketStatus::Resolved, at(2024, 3, 9, 8), Some(at(2024, 3, 12, 8))),
            // outside the period entirely
            ticket(TicketType::Bug, TicketStatus::Open, at(2024, 3, 11, 0), None),
        ];

        let stats = compute_stats(&period, &tickets);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.resolved, 2);
        assert_eq!(stats.open_backlog, 2);
        assert_eq!(stats.avg_resolution_hours, Some(27.0));
        assert_eq!(stats.by_status["resolved"], 2);
        assert_eq!(stats.by_status["pending"], 0);
        assert_eq!(stats.by_root_cause["development"], 1);
        assert_eq!(stats.by_root_cause["infrastructure"], 1);
        assert_eq!(stats.by_root_cause["user_request"], 1);
        assert_eq!(stats.by_root_cause["requirements"], 1);

        assert_eq!(stats.series.len(), 7);
        assert_eq!(stats.series[0].created, 2);
        assert_eq!(stats.series[0].resolved, 1);
        assert_eq!(stats.series[2].resolved, 1);
        assert_eq!(stats.series[4].created, 1);
        assert_eq!(stats.series.iter().map(|p| p.created).sum::<usize>(), 4);
    }

    #[test]
    fn test_empty_period() {
        let period: PeriodKey = "2024-Q2".parse().unwrap();
        let stats = compute_stats(&period, &[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.avg_resolution_hours, None);
        assert_eq!(stats.series.len(), 3);
        assert_eq!(stats.by_type.len(), TicketType::ALL.len());
    }

    #[test]
    fn test_comparison() {
        let period: PeriodKey = "2024-03".parse().unwrap();
        let previous_period = period.previous();
        let current = compute_stats(
            &period,
            &[
                ticket(TicketType::Bug, TicketStatus::Open, at(2024, 3, 2, 0), None),
                ticket(TicketType::Bug, TicketStatus::Open, at(2024, 3, 3, 0), None),
                ticket(TicketType::Bug, TicketStatus::Open, at(2024, 3, 4, 0), None),
            ],
        );
        let previous = compute_stats(
            &previous_period,
            &[
                ticket(TicketType::Bug, TicketStatus::Open, at(2024, 2, 2, 0), None),
                ticket(TicketType::Bug, TicketStatus::Open, at(2024, 2, 3, 0), None),
            ],
        );
        let compared = compare(current, &previous);
        let comparison = compared.previous.unwrap();
        assert_eq!(comparison.period, "2024-02");
        assert_eq!(comparison.total, 2);
        assert_eq!(comparison.change_pct, Some(50.0));

        let empty = compute_stats(&previous_period, &[]);
        let compared = compare(compute_stats(&period, &[]), &empty);
        assert_eq!(compared.previous.unwrap().change_pct, None);
    }
}
