use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// One day of work for one user: summarize `[from, to)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregationJob {
    pub user_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// First instant of `date` in `tz`. Normally midnight; on days where a DST
/// transition skips midnight, the first local time that exists.
pub fn start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Tz> {
    let midnight = date.and_time(NaiveTime::default());
    for minutes in (0..24 * 60).step_by(15) {
        let local = midnight + Duration::minutes(minutes);
        if let Some(instant) = tz.from_local_datetime(&local).earliest() {
            return instant;
        }
    }
    tz.from_utc_datetime(&midnight)
}

fn next_day_start<Tz: TimeZone>(instant: &DateTime<Tz>, tz: &Tz) -> Option<DateTime<Tz>> {
    let next = instant.date_naive().succ_opt()?;
    Some(start_of_day(next, tz))
}

/// Lazy sequence of one-day jobs for a single user. Cloning restarts from the
/// clone point.
#[derive(Debug, Clone)]
pub struct UserJobs<Tz: TimeZone> {
    user_id: String,
    from: Option<DateTime<Tz>>,
    end: DateTime<Tz>,
    tz: Tz,
}

impl<Tz: TimeZone> Iterator for UserJobs<Tz> {
    type Item = AggregationJob;

    fn next(&mut self) -> Option<Self::Item> {
        let from = self.from.take()?;
        if from >= self.end {
            return None;
        }
        let to = next_day_start(&from, &self.tz)?;
        self.from = Some(to.clone());
        Some(AggregationJob {
            user_id: self.user_id.clone(),
            from: from.with_timezone(&Utc),
            to: to.with_timezone(&Utc),
        })
    }
}

/// Jobs covering the gap between `frontier` and the start of the day containing
/// `now`, with day boundaries taken in `tz`.
///
/// A frontier sitting exactly on a day boundary (the end of a stored summary)
/// starts the first bucket. Any other frontier, such as a first heartbeat in the
/// middle of a day, is moved forward to the next day boundary: the partial day is
/// never summarized. The day containing `now` is never emitted.
pub fn generate_jobs<Tz: TimeZone>(
    user_id: &str,
    frontier: DateTime<Utc>,
    now: DateTime<Utc>,
    tz: &Tz,
) -> UserJobs<Tz> {
    let today_start = start_of_day(now.with_timezone(tz).date_naive(), tz);
    let end = today_start - Duration::seconds(1);

    let frontier = frontier.with_timezone(tz);
    let from = if frontier == start_of_day(frontier.date_naive(), tz) {
        Some(frontier)
    } else {
        next_day_start(&frontier, tz)
    };

    UserJobs {
        user_id: user_id.to_string(),
        from,
        end,
        tz: tz.clone(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;

    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn windows(jobs: UserJobs<impl TimeZone>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        jobs.map(|job| (job.from, job.to)).collect()
    }

    #[test]
    fn mid_day_first_heartbeat_skips_partial_day() {
        let now = utc(2024, 1, 6, 10, 30, 0);
        let jobs = generate_jobs("U1", utc(2024, 1, 3, 14, 0, 0), now, &Utc);

        assert_eq!(
            windows(jobs),
            vec![
                (utc(2024, 1, 4, 0, 0, 0), utc(2024, 1, 5, 0, 0, 0)),
                (utc(2024, 1, 5, 0, 0, 0), utc(2024, 1, 6, 0, 0, 0)),
            ]
        );
    }

    #[test]
    fn aligned_frontier_starts_first_bucket() {
        let now = utc(2024, 1, 6, 0, 0, 1);
        let jobs: Vec<_> = generate_jobs("U2", utc(2024, 1, 5, 0, 0, 0), now, &Utc).collect();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].user_id, "U2");
        assert_eq!(jobs[0].from, utc(2024, 1, 5, 0, 0, 0));
        assert_eq!(jobs[0].to, utc(2024, 1, 6, 0, 0, 0));
    }

    #[test]
    fn frontier_at_start_of_today_is_caught_up() {
        let now = utc(2024, 1, 6, 23, 59, 59);
        assert_eq!(
            generate_jobs("U2", utc(2024, 1, 6, 0, 0, 0), now, &Utc).count(),
            0
        );
    }

    #[test]
    fn frontier_in_future_yields_nothing() {
        let now = utc(2024, 1, 6, 12, 0, 0);
        assert_eq!(
            generate_jobs("U2", utc(2024, 1, 9, 0, 0, 0), now, &Utc).count(),
            0
        );
    }

    #[test]
    fn first_heartbeat_yesterday_yields_nothing() {
        let now = utc(2024, 1, 6, 12, 0, 0);
        assert_eq!(
            generate_jobs("U1", utc(2024, 1, 5, 8, 0, 0), now, &Utc).count(),
            0
        );
    }

    #[test]
    fn sub_hour_offset_past_midnight_is_not_aligned() {
        let now = utc(2024, 1, 6, 12, 0, 0);
        let jobs: Vec<_> =
            generate_jobs("U1", utc(2024, 1, 4, 0, 0, 30), now, &Utc).collect();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].from, utc(2024, 1, 5, 0, 0, 0));
    }

    #[test]
    fn day_boundaries_follow_time_zone() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        // 2024-01-05 00:00 at +02:00
        let frontier = utc(2024, 1, 4, 22, 0, 0);
        let now = utc(2024, 1, 6, 23, 0, 0); // 2024-01-07 01:00 local

        let got = windows(generate_jobs("U1", frontier, now, &tz));
        assert_eq!(
            got,
            vec![
                (utc(2024, 1, 4, 22, 0, 0), utc(2024, 1, 5, 22, 0, 0)),
                (utc(2024, 1, 5, 22, 0, 0), utc(2024, 1, 6, 22, 0, 0)),
            ]
        );
    }

    #[test]
    fn sequence_restarts_from_clone() {
        let now = utc(2024, 1, 10, 0, 0, 0);
        let mut jobs = generate_jobs("U1", utc(2024, 1, 1, 0, 0, 0), now, &Utc);
        jobs.next();
        let rest = jobs.clone();
        assert_eq!(jobs.count(), 8);
        assert_eq!(rest.count(), 8);
    }
}
