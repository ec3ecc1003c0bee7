//! Month-picker arithmetic: month lengths, weekday alignment, and the
//! flat cell sequence a 7-column calendar is rendered from.

use std::fmt;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  Days,
  NaiveDate,
  Weekday
};

use crate::datetime::parse_month_name;

/// A validated (year, month) pair. Day 1 of this month and of the next
/// month are both representable, so the helpers below never fail.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash
)]
pub struct YearMonth {
  year:  i32,
  month: u32
}

impl YearMonth {
  pub fn new(
    year: i32,
    month: u32
  ) -> anyhow::Result<Self> {
    if !(1..=12).contains(&month) {
      return Err(anyhow!(
        "month must be 1-12, got {month}"
      ));
    }
    let (next_year, next_month) =
      next_month_of(year, month);
    if NaiveDate::from_ymd_opt(
      year, month, 1
    )
    .is_none()
      || NaiveDate::from_ymd_opt(
        next_year, next_month, 1
      )
      .is_none()
    {
      return Err(anyhow!(
        "year out of range: {year}"
      ));
    }
    Ok(Self { year, month })
  }

  #[must_use]
  pub fn of(date: NaiveDate) -> Self {
    Self {
      year:  date.year(),
      month: date.month()
    }
  }

  pub fn year(&self) -> i32 {
    self.year
  }

  pub fn month(&self) -> u32 {
    self.month
  }

  #[must_use]
  pub fn first_day(&self) -> NaiveDate {
    NaiveDate::from_ymd_opt(
      self.year, self.month, 1
    )
    .unwrap_or(NaiveDate::MIN)
  }

  #[must_use]
  pub fn last_day(&self) -> NaiveDate {
    let (next_year, next_month) =
      next_month_of(self.year, self.month);
    NaiveDate::from_ymd_opt(
      next_year, next_month, 1
    )
    .and_then(|first| first.pred_opt())
    .unwrap_or(NaiveDate::MAX)
  }

  /// Picking `day` in the grid. `None` for days past the month's end.
  #[must_use]
  pub fn date(
    &self,
    day: u32
  ) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
      self.year, self.month, day
    )
  }

  /// Previous/next month navigation. Stays put if the target falls
  /// outside the representable range.
  #[must_use]
  pub fn shift(
    &self,
    months: i32
  ) -> Self {
    let index = i64::from(self.year) * 12
      + i64::from(self.month)
      - 1
      + i64::from(months);
    let year = index.div_euclid(12);
    let month =
      index.rem_euclid(12) as u32 + 1;
    i32::try_from(year)
      .ok()
      .and_then(|year| {
        Self::new(year, month).ok()
      })
      .unwrap_or(*self)
  }

  /// Accepts `YYYY-MM`, `YYYY-M`, month names (in `anchor`'s year) and
  /// `+N` / `-N` month offsets from `anchor`.
  #[tracing::instrument(skip(anchor))]
  pub fn parse(
    input: &str,
    anchor: YearMonth
  ) -> anyhow::Result<Self> {
    let token = input.trim();
    let lower =
      token.to_ascii_lowercase();

    if let Some(month) =
      parse_month_name(&lower)
    {
      return Self::new(
        anchor.year,
        month
      );
    }

    if token.starts_with(['+', '-']) {
      let offset: i32 = token
        .parse()
        .context("invalid month offset")?;
      return Ok(anchor.shift(offset));
    }

    let (year, month) = token
      .split_once('-')
      .ok_or_else(|| {
        anyhow!(
          "expected YYYY-MM, a month \
           name, or +N/-N, got: {input}"
        )
      })?;
    let year: i32 = year
      .parse()
      .context("invalid year")?;
    let month: u32 = month
      .parse()
      .context("invalid month")?;
    Self::new(year, month)
  }
}

impl fmt::Display for YearMonth {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "{} {}",
      month_name(self.month),
      self.year
    )
  }
}

fn next_month_of(
  year: i32,
  month: u32
) -> (i32, u32) {
  if month >= 12 {
    (year.saturating_add(1), 1)
  } else {
    (year, month + 1)
  }
}

/// One slot of the month grid.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum GridCell {
  Blank,
  Day(u32)
}

impl GridCell {
  pub fn day(&self) -> Option<u32> {
    match self {
      | Self::Blank => None,
      | Self::Day(day) => Some(*day)
    }
  }
}

#[must_use]
pub fn days_in_month(
  ym: YearMonth
) -> u32 {
  ym.last_day().day()
}

/// Column of day 1, counted from `week_start`.
#[must_use]
pub fn first_weekday(
  ym: YearMonth,
  week_start: Weekday
) -> u32 {
  let day_idx = ym
    .first_day()
    .weekday()
    .num_days_from_monday();
  let start_idx =
    week_start.num_days_from_monday();
  (7 + day_idx - start_idx) % 7
}

/// Leading blanks, then `1..=days_in_month`. Trailing padding for the
/// last row is left to the renderer.
#[must_use]
pub fn month_grid(
  ym: YearMonth,
  week_start: Weekday
) -> Vec<GridCell> {
  let blanks = first_weekday(ym, week_start);
  let days = days_in_month(ym);

  let mut cells = Vec::with_capacity(
    (blanks + days) as usize
  );
  cells.extend(
    (0..blanks).map(|_| GridCell::Blank)
  );
  cells.extend(
    (1..=days).map(GridCell::Day)
  );
  cells
}

/// Same calendar day; time-of-day and offsets are ignored.
pub fn is_same_day<A, B>(
  a: &A,
  b: &B
) -> bool
where
  A: Datelike,
  B: Datelike
{
  a.year() == b.year()
    && a.month() == b.month()
    && a.day() == b.day()
}

pub fn week_start_from_config(
  raw: &str
) -> Weekday {
  if raw
    .trim()
    .eq_ignore_ascii_case("monday")
  {
    Weekday::Mon
  } else {
    Weekday::Sun
  }
}

#[must_use]
pub fn month_name(
  month: u32
) -> &'static str {
  match month {
    | 1 => "January",
    | 2 => "February",
    | 3 => "March",
    | 4 => "April",
    | 5 => "May",
    | 6 => "June",
    | 7 => "July",
    | 8 => "August",
    | 9 => "September",
    | 10 => "October",
    | 11 => "November",
    | 12 => "December",
    | _ => "?"
  }
}

pub fn weekday_labels(
  week_start: Weekday
) -> [&'static str; 7] {
  let mut labels = [""; 7];
  let mut day = week_start;
  for label in &mut labels {
    *label = match day {
      | Weekday::Sun => "Su",
      | Weekday::Mon => "Mo",
      | Weekday::Tue => "Tu",
      | Weekday::Wed => "We",
      | Weekday::Thu => "Th",
      | Weekday::Fri => "Fr",
      | Weekday::Sat => "Sa"
    };
    day = day.succ();
  }
  labels
}

/// Dates covered by the month, for marking days that hold tasks.
pub fn month_dates(
  ym: YearMonth
) -> impl Iterator<Item = NaiveDate> {
  let first = ym.first_day();
  (0..u64::from(days_in_month(ym))).filter_map(
    move |offset| {
      first.checked_add_days(Days::new(
        offset
      ))
    }
  )
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc,
    Weekday
  };

  use super::*;

  fn ym(
    year: i32,
    month: u32
  ) -> YearMonth {
    YearMonth::new(year, month)
      .expect("valid month")
  }

  #[test]
  fn february_follows_leap_years() {
    assert_eq!(days_in_month(ym(2024, 2)), 29);
    assert_eq!(days_in_month(ym(2023, 2)), 28);
    assert_eq!(days_in_month(ym(1900, 2)), 28);
    assert_eq!(days_in_month(ym(2000, 2)), 29);
    assert_eq!(days_in_month(ym(2024, 12)), 31);
    assert_eq!(days_in_month(ym(2024, 4)), 30);
  }

  #[test]
  fn rejects_invalid_month() {
    assert!(YearMonth::new(2024, 0).is_err());
    assert!(YearMonth::new(2024, 13).is_err());
  }

  #[test]
  fn first_weekday_respects_week_start() {
    // 2024-03-01 is a Friday.
    assert_eq!(
      first_weekday(ym(2024, 3), Weekday::Sun),
      5
    );
    assert_eq!(
      first_weekday(ym(2024, 3), Weekday::Mon),
      4
    );
    // 2024-09-01 is a Sunday.
    assert_eq!(
      first_weekday(ym(2024, 9), Weekday::Sun),
      0
    );
    assert_eq!(
      first_weekday(ym(2024, 9), Weekday::Mon),
      6
    );
  }

  #[test]
  fn grid_is_blanks_then_every_day() {
    for year in [1999, 2000, 2023, 2024, 2100] {
      for month in 1..=12 {
        for week_start in [Weekday::Sun, Weekday::Mon] {
          let ym = ym(year, month);
          let cells = month_grid(ym, week_start);
          let blanks = first_weekday(ym, week_start);
          let days = days_in_month(ym);

          assert_eq!(
            cells.len() as u32,
            blanks + days
          );
          assert!(
            cells[..blanks as usize]
              .iter()
              .all(|c| *c == GridCell::Blank)
          );
          let numbers: Vec<u32> = cells
            .iter()
            .filter_map(GridCell::day)
            .collect();
          assert_eq!(
            numbers,
            (1..=days).collect::<Vec<_>>()
          );
        }
      }
    }
  }

  #[test]
  fn shift_rolls_over_years() {
    assert_eq!(ym(2024, 12).shift(1), ym(2025, 1));
    assert_eq!(ym(2024, 1).shift(-1), ym(2023, 12));
    assert_eq!(ym(2024, 3).shift(-15), ym(2022, 12));
    assert_eq!(ym(2024, 3).shift(0), ym(2024, 3));
  }

  #[test]
  fn selecting_a_day_builds_the_date() {
    assert_eq!(
      ym(2024, 2).date(29),
      NaiveDate::from_ymd_opt(2024, 2, 29)
    );
    assert_eq!(ym(2023, 2).date(29), None);
  }

  #[test]
  fn parses_month_arguments() {
    let anchor = ym(2024, 3);
    assert_eq!(
      YearMonth::parse("2025-01", anchor)
        .expect("padded"),
      ym(2025, 1)
    );
    assert_eq!(
      YearMonth::parse("+10", anchor)
        .expect("offset"),
      ym(2025, 1)
    );
    assert_eq!(
      YearMonth::parse("-3", anchor)
        .expect("offset"),
      ym(2023, 12)
    );
    assert_eq!(
      YearMonth::parse("Dec", anchor)
        .expect("name"),
      ym(2024, 12)
    );
    assert!(YearMonth::parse("2024-13", anchor).is_err());
    assert!(YearMonth::parse("soon", anchor).is_err());
  }

  #[test]
  fn malformed_offsets_are_errors() {
    let anchor = ym(2024, 3);
    assert!(
      YearMonth::parse("--2147483648", anchor)
        .is_err()
    );
    assert!(
      YearMonth::parse("+-3", anchor).is_err()
    );
    assert_eq!(
      YearMonth::parse("-2147483648", anchor)
        .expect("extreme offset"),
      anchor
    );
  }

  #[test]
  fn same_day_ignores_time_of_day() {
    let morning = Utc
      .with_ymd_and_hms(2024, 3, 7, 10, 0, 0)
      .single()
      .expect("valid time");
    let night = Utc
      .with_ymd_and_hms(2024, 3, 7, 23, 0, 0)
      .single()
      .expect("valid time");
    let next = Utc
      .with_ymd_and_hms(2024, 3, 8, 0, 0, 0)
      .single()
      .expect("valid time");
    assert!(is_same_day(&morning, &night));
    assert!(!is_same_day(&night, &next));
    assert!(is_same_day(
      &morning,
      &morning.date_naive()
    ));
  }

  #[test]
  fn labels_start_on_configured_day() {
    assert_eq!(
      weekday_labels(Weekday::Sun),
      ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"]
    );
    assert_eq!(
      weekday_labels(week_start_from_config("Monday"))[6],
      "Su"
    );
  }

  #[test]
  fn display_names_the_month() {
    assert_eq!(ym(2024, 3).to_string(), "March 2024");
    assert_eq!(month_dates(ym(2024, 2)).count(), 29);
  }
}
