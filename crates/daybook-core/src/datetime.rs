use std::fmt;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Days,
  Local,
  NaiveDate,
  TimeDelta,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{
  Deserialize,
  Serialize
};

const TIMEZONE_CONFIG_FILE: &str =
  "daybook-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "DAYBOOK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "DAYBOOK_TIME_CONFIG";

static RELATIVE_DAYS_RE: OnceLock<Regex> =
  OnceLock::new();
static YMD_RE: OnceLock<Regex> =
  OnceLock::new();

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Which wall clock decides the calendar day of "now".
///
/// Every `DayKey` is derived from a date in this timezone, so two
/// machines sharing a data directory agree only if they share the
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimezonePolicy {
  Local,
  Zone(Tz)
}

impl TimezonePolicy {
  /// Resolution order: `DAYBOOK_TIMEZONE`, then `daybook-time.toml`,
  /// then the `timezone` config key, then the OS local zone.
  #[tracing::instrument]
  pub fn resolve(
    configured: Option<&str>
  ) -> Self {
    let env_value =
      std::env::var(TIMEZONE_ENV_VAR)
        .ok();
    resolve_from(
      env_value.as_deref(),
      timezone_config_path().as_deref(),
      configured
    )
  }

  #[must_use]
  pub fn local_date(
    &self,
    now: DateTime<Utc>
  ) -> NaiveDate {
    match self {
      | Self::Local => {
        now
          .with_timezone(&Local)
          .date_naive()
      }
      | Self::Zone(tz) => {
        now.with_timezone(tz).date_naive()
      }
    }
  }

  #[must_use]
  pub fn label(&self) -> String {
    match self {
      | Self::Local => "local".to_string(),
      | Self::Zone(tz) => tz.name().to_string()
    }
  }
}

fn resolve_from(
  env_value: Option<&str>,
  file: Option<&Path>,
  configured: Option<&str>
) -> TimezonePolicy {
  if let Some(raw) = env_value
    && let Some(tz) =
      parse_timezone(raw, TIMEZONE_ENV_VAR)
  {
    return TimezonePolicy::Zone(tz);
  }

  if let Some(path) = file
    && let Some(tz) =
      load_timezone_from_file(path)
  {
    return TimezonePolicy::Zone(tz);
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config:timezone")
  {
    return TimezonePolicy::Zone(tz);
  }

  tracing::debug!(
    "no timezone configured; using OS \
     local time"
  );
  TimezonePolicy::Local
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Storage key of one calendar day, `"{year}-{month}-{day}"` without
/// zero padding (`"2024-3-7"`).
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize
)]
#[serde(transparent)]
pub struct DayKey(String);

impl DayKey {
  #[must_use]
  pub fn from_date(
    date: NaiveDate
  ) -> Self {
    Self(format!(
      "{}-{}-{}",
      date.year(),
      date.month(),
      date.day()
    ))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Date this key denotes, or `None` for keys written by something
  /// other than [`DayKey::from_date`].
  pub fn date(&self) -> Option<NaiveDate> {
    let mut parts = self.0.splitn(3, '-');
    let year = parts.next()?.parse().ok()?;
    let month =
      parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(
      year, month, day
    )
  }
}

impl fmt::Display for DayKey {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[must_use]
pub fn day_key(
  date: NaiveDate
) -> DayKey {
  DayKey::from_date(date)
}

/// Header label for the day view, e.g. `"Thursday 7/3"`.
#[must_use]
pub fn format_day_label(
  date: NaiveDate
) -> String {
  format!(
    "{} {}/{}",
    weekday_name(date.weekday()),
    date.day(),
    date.month()
  )
}

#[must_use]
pub fn weekday_name(
  weekday: Weekday
) -> &'static str {
  match weekday {
    | Weekday::Sun => "Sunday",
    | Weekday::Mon => "Monday",
    | Weekday::Tue => "Tuesday",
    | Weekday::Wed => "Wednesday",
    | Weekday::Thu => "Thursday",
    | Weekday::Fri => "Friday",
    | Weekday::Sat => "Saturday"
  }
}

/// Resolves a user-supplied date relative to `today`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" | "now" => {
      return Ok(today);
    }
    | "tomorrow" => {
      return shift_days(today, 1);
    }
    | "yesterday" => {
      return shift_days(today, -1);
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return next_weekday_date(
      today,
      target_weekday
    );
  }

  let rel_re = cached_regex(
    &RELATIVE_DAYS_RE,
    r"^(?P<sign>[+-])(?P<num>\d+)d?$"
  )?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let signed = if caps
      .name("sign")
      .is_some_and(|m| m.as_str() == "-")
    {
      -num
    } else {
      num
    };
    return shift_days(today, signed);
  }

  let ymd_re = cached_regex(
    &YMD_RE,
    r"^(?P<y>\d{4})-(?P<m>\d{1,2})-(?P<d>\d{1,2})$"
  )?;

  if let Some(caps) =
    ymd_re.captures(token)
  {
    let year: i32 = caps["y"]
      .parse()
      .context("invalid year")?;
    let month: u32 = caps["m"]
      .parse()
      .context("invalid month")?;
    let day: u32 = caps["d"]
      .parse()
      .context("invalid day")?;
    return NaiveDate::from_ymd_opt(
      year, month, day
    )
    .ok_or_else(|| {
      anyhow!(
        "date does not exist: {token}"
      )
    });
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday, weekday \
     names (e.g. monday), +N/-N days, \
     YYYY-MM-DD or YYYY-M-D"
  })
}

fn cached_regex(
  cell: &'static OnceLock<Regex>,
  pattern: &str
) -> anyhow::Result<&'static Regex> {
  if let Some(re) = cell.get() {
    return Ok(re);
  }
  let re =
    Regex::new(pattern).map_err(|e| {
      anyhow!(
        "internal regex compile failure: \
         {e}"
      )
    })?;
  Ok(cell.get_or_init(|| re))
}

fn shift_days(
  date: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  TimeDelta::try_days(days)
    .and_then(|delta| {
      date.checked_add_signed(delta)
    })
    .ok_or_else(|| {
      anyhow!(
        "date out of range: {date} \
         {days:+} days"
      )
    })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> anyhow::Result<NaiveDate> {
  let from_idx = u64::from(
    from.weekday().num_days_from_monday()
  );
  let target_idx = u64::from(
    target.num_days_from_monday()
  );
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_days(Days::new(delta))
    .ok_or_else(|| {
      anyhow!(
        "date out of range: next \
         {target} after {from}"
      )
    })
}

pub(crate) fn parse_month_name(
  token: &str
) -> Option<u32> {
  match token.trim() {
    | "january" | "jan" => Some(1),
    | "february" | "feb" => Some(2),
    | "march" | "mar" => Some(3),
    | "april" | "apr" => Some(4),
    | "may" => Some(5),
    | "june" | "jun" => Some(6),
    | "july" | "jul" => Some(7),
    | "august" | "aug" => Some(8),
    | "september" | "sep" | "sept" => {
      Some(9)
    }
    | "october" | "oct" => Some(10),
    | "november" | "nov" => Some(11),
    | "december" | "dec" => Some(12),
    | _ => None
  }
}
