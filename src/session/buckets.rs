//! Calendar buckets for the conversation list.
//!
//! "This week" starts on the most recent Sunday at local midnight; "this
//! month" is the same calendar month and year as `now`.

use chrono::{DateTime, Datelike, Days, NaiveTime, TimeZone, Utc};

use crate::core::model::Conversation;

/// Bucket of one conversation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Bucket {
    /// Created on or after the start of the current week.
    ThisWeek,
    /// Earlier this calendar month.
    ThisMonth,
    /// Anything before.
    Older,
}

/// Conversations split into buckets, each keeping the input order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Buckets {
    /// This week.
    pub this_week: Vec<Conversation>,
    /// This month, before this week.
    pub this_month: Vec<Conversation>,
    /// Older.
    pub older: Vec<Conversation>,
}

impl Buckets {
    /// Total number of conversations across buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.this_week.len() + self.this_month.len() + self.older.len()
    }

    /// Whether every bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Most recent Sunday at local midnight, in `now`'s time zone.
#[must_use]
pub fn week_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let today = now.date_naive();
    let back = u64::from(today.weekday().num_days_from_sunday());
    let sunday = today.checked_sub_days(Days::new(back)).unwrap_or(today);
    let midnight = sunday.and_time(NaiveTime::MIN);
    let tz = now.timezone();
    tz.from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight))
}

/// Bucket of a creation time relative to `now`.
#[must_use]
pub fn classify<Tz: TimeZone>(created_at: &DateTime<Utc>, now: &DateTime<Tz>) -> Bucket {
    let local = created_at.with_timezone(&now.timezone());
    if local >= week_start(now) {
        Bucket::ThisWeek
    } else if local.year() == now.year() && local.month() == now.month() {
        Bucket::ThisMonth
    } else {
        Bucket::Older
    }
}

/// Split `conversations` (newest first) into buckets.
#[must_use]
pub fn bucket<Tz: TimeZone>(conversations: &[Conversation], now: &DateTime<Tz>) -> Buckets {
    let mut out = Buckets::default();
    for conversation in conversations {
        let target = match classify(&conversation.created_at, now) {
            Bucket::ThisWeek => &mut out.this_week,
            Bucket::ThisMonth => &mut out.this_month,
            Bucket::Older => &mut out.older,
        };
        target.push(conversation.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;

    use super::*;
    use crate::core::ids::IdentityId;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    fn now(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    #[test]
    fn test_week_starts_sunday_local_midnight() {
        let wednesday = now("2025-06-18T10:00:00+02:00");
        assert_eq!(week_start(&wednesday), now("2025-06-15T00:00:00+02:00"));

        let sunday = now("2025-06-15T08:00:00+02:00");
        assert_eq!(week_start(&sunday), now("2025-06-15T00:00:00+02:00"));
    }

    #[test]
    fn test_classify_uses_local_calendar() {
        let wednesday = now("2025-06-18T10:00:00+02:00");
        assert_eq!(classify(&at("2025-06-14T22:30:00Z"), &wednesday), Bucket::ThisWeek);
        assert_eq!(classify(&at("2025-06-14T21:59:00Z"), &wednesday), Bucket::ThisMonth);
        assert_eq!(classify(&at("2025-06-01T08:00:00+02:00"), &wednesday), Bucket::ThisMonth);
        assert_eq!(classify(&at("2025-05-31T12:00:00+02:00"), &wednesday), Bucket::Older);
        assert_eq!(classify(&at("2024-06-10T12:00:00+02:00"), &wednesday), Bucket::Older);
    }

    #[test]
    fn test_week_spanning_month_boundary() {
        let thursday = now("2025-07-03T09:00:00+00:00");
        assert_eq!(classify(&at("2025-06-30T09:00:00Z"), &thursday), Bucket::ThisWeek);
        assert_eq!(classify(&at("2025-06-20T09:00:00Z"), &thursday), Bucket::Older);
    }

    #[test]
    fn test_every_conversation_lands_in_one_bucket_in_order() {
        let owner = IdentityId::new("U1").unwrap();
        let reference = now("2025-06-18T10:00:00+02:00");
        let stamps = [
            "2025-06-18T09:00:00+02:00",
            "2025-06-16T09:00:00+02:00",
            "2025-06-10T09:00:00+02:00",
            "2025-06-02T09:00:00+02:00",
            "2025-04-02T09:00:00+02:00",
        ];
        let conversations: Vec<Conversation> = stamps
            .iter()
            .map(|stamp| {
                let mut conversation = Conversation::new(owner.clone(), "t");
                conversation.created_at = at(stamp);
                conversation
            })
            .collect();

        let buckets = bucket(&conversations, &reference);
        assert_eq!(buckets.len(), conversations.len());
        assert_eq!(buckets.this_week, conversations[..2].to_vec());
        assert_eq!(buckets.this_month, conversations[2..4].to_vec());
        assert_eq!(buckets.older, conversations[4..].to_vec());
    }
}
