//! Deposit due dates and late fines.
//!
//! Due dates always land on 23:59:59 UTC of the due day, so a deposit made any
//! time on that day is on time.
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::{
    error::ScheduleError,
    policy::{DepositPolicy, DepositScheduleType},
};

text_enum! {
    pub enum DepositTiming {
        Early => "early",
        OnTime => "on_time",
        Late => "late",
    }
}

impl DepositTiming {
    pub fn classify(deposited: DateTime<Utc>, due: DateTime<Utc>) -> Self {
        if deposited > due {
            DepositTiming::Late
        } else if deposited.date_naive() < due.date_naive() {
            DepositTiming::Early
        } else {
            DepositTiming::OnTime
        }
    }
}

pub fn calculate_due_date(
    policy: &DepositPolicy,
    reference: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    match policy.schedule_type {
        DepositScheduleType::MonthlyFixedDay => {
            let due_day = policy.due_day_of_month.ok_or(ScheduleError::MissingDueDay)?;
            monthly_due_date(reference, due_day)
        }
        DepositScheduleType::Occasional => {
            let months = policy
                .allowed_months
                .ok_or(ScheduleError::MissingAllowedMonths)?;
            occasional_due_date(reference, months)
        }
    }
}

fn monthly_due_date(reference: DateTime<Utc>, due_day: u32) -> Result<DateTime<Utc>, ScheduleError> {
    let (mut year, mut month) = (reference.year(), reference.month());

    if reference.day() >= due_day {
        if month == 12 {
            month = 1;
            year += 1;
        } else {
            month += 1;
        }
    }

    let day = due_day.clamp(1, days_in_month(year, month));

    end_of_day(year, month, day)
}

fn occasional_due_date(reference: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>, ScheduleError> {
    let due = reference + Duration::days(30 * i64::from(months));

    end_of_day(due.year(), due.month(), due.day())
}

fn end_of_day(year: i32, month: u32, day: u32) -> Result<DateTime<Utc>, ScheduleError> {
    Utc.with_ymd_and_hms(year, month, day, 23, 59, 59)
        .single()
        .ok_or(ScheduleError::OutOfRange)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}

pub fn is_deposit_late(deposited: DateTime<Utc>, due: DateTime<Utc>) -> bool {
    deposited > due
}

/// Percent fine on the amount due, rounded to paisa. Zero unless late.
pub fn calculate_late_fine(
    deposited: DateTime<Utc>,
    due: DateTime<Utc>,
    fine_percentage: Decimal,
    amount_due: Decimal,
) -> Decimal {
    if !is_deposit_late(deposited, due) {
        return Decimal::ZERO;
    }

    (amount_due * fine_percentage / Decimal::ONE_HUNDRED).round_dp(2)
}

/// Calendar days from `reference` to `due`, negative once overdue.
pub fn days_until_due(due: DateTime<Utc>, reference: DateTime<Utc>) -> i64 {
    (due.date_naive() - reference.date_naive()).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyHeader;

    fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
    }

    fn end(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 23, 59, 59).unwrap()
    }

    fn monthly(day: u32) -> DepositPolicy {
        DepositPolicy {
            header: PolicyHeader::draft("admin@yugantar.org", at(2026, 1, 1, 0)),
            amount_paisa: 100_000,
            late_deposit_fine: Decimal::new(5, 0),
            schedule_type: DepositScheduleType::MonthlyFixedDay,
            due_day_of_month: Some(day),
            allowed_months: None,
            max_occurrences: None,
        }
    }

    #[test]
    fn test_monthly_before_due_day_stays_in_month() {
        let due = calculate_due_date(&monthly(15), at(2026, 3, 3, 10)).unwrap();
        assert_eq!(due, end(2026, 3, 15));
    }

    #[test]
    fn test_monthly_on_or_after_due_day_moves_on() {
        assert_eq!(
            calculate_due_date(&monthly(15), at(2026, 3, 15, 1)).unwrap(),
            end(2026, 4, 15)
        );
        assert_eq!(
            calculate_due_date(&monthly(15), at(2026, 12, 20, 1)).unwrap(),
            end(2027, 1, 15)
        );
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        assert_eq!(
            calculate_due_date(&monthly(31), at(2026, 1, 31, 8)).unwrap(),
            end(2026, 2, 28)
        );
        assert_eq!(
            calculate_due_date(&monthly(30), at(2028, 1, 30, 8)).unwrap(),
            end(2028, 2, 29)
        );
    }

    #[test]
    fn test_occasional_adds_thirty_day_months() {
        let mut policy = monthly(1);
        policy.schedule_type = DepositScheduleType::Occasional;
        policy.allowed_months = Some(3);

        assert_eq!(
            calculate_due_date(&policy, at(2026, 1, 1, 9)).unwrap(),
            end(2026, 4, 1)
        );
    }

    #[test]
    fn test_missing_schedule_parameters() {
        let mut policy = monthly(1);
        policy.due_day_of_month = None;
        assert_eq!(
            calculate_due_date(&policy, at(2026, 1, 1, 0)),
            Err(ScheduleError::MissingDueDay)
        );

        policy.schedule_type = DepositScheduleType::Occasional;
        assert_eq!(
            calculate_due_date(&policy, at(2026, 1, 1, 0)),
            Err(ScheduleError::MissingAllowedMonths)
        );
    }

    #[test]
    fn test_late_fine() {
        let due = end(2026, 3, 15);
        let amount = Decimal::new(1000, 0);

        assert_eq!(
            calculate_late_fine(at(2026, 3, 15, 20), due, Decimal::new(5, 0), amount),
            Decimal::ZERO
        );
        assert_eq!(
            calculate_late_fine(at(2026, 3, 16, 0), due, Decimal::new(5, 0), amount),
            Decimal::new(50, 0)
        );
        assert_eq!(
            calculate_late_fine(at(2026, 3, 16, 0), due, Decimal::new(25, 1), Decimal::new(333, 0)),
            Decimal::new(832, 2)
        );
    }

    #[test]
    fn test_timing() {
        let due = end(2026, 3, 15);

        assert_eq!(DepositTiming::classify(at(2026, 3, 10, 9), due), DepositTiming::Early);
        assert_eq!(DepositTiming::classify(at(2026, 3, 15, 9), due), DepositTiming::OnTime);
        assert_eq!(DepositTiming::classify(at(2026, 3, 16, 0), due), DepositTiming::Late);
    }

    #[test]
    fn test_days_until_due() {
        let due = end(2026, 3, 15);

        assert_eq!(days_until_due(due, at(2026, 3, 10, 23)), 5);
        assert_eq!(days_until_due(due, at(2026, 3, 15, 0)), 0);
        assert_eq!(days_until_due(due, at(2026, 3, 18, 0)), -3);
    }
}
