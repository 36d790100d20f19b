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
  Duration,
  LocalResult,
  NaiveDate,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "hedgehog-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "HEDGEHOG_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "HEDGEHOG_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "UTC";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Timezone in which timestamps are reduced to calendar days.
pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

#[must_use]
pub fn to_project_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(project_timezone())
    .date_naive()
}

#[must_use]
pub fn format_project_date(
  dt: DateTime<Utc>
) -> String {
  dt.with_timezone(project_timezone())
    .format("%Y-%m-%d")
    .to_string()
}

/// The instant at which `date` begins in the project timezone.
pub fn project_midnight(
  date: NaiveDate
) -> anyhow::Result<DateTime<Utc>> {
  let midnight = date
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| {
      anyhow!(
        "failed to construct \
         midnight for {date}"
      )
    })?;

  match project_timezone()
    .from_local_datetime(&midnight)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        %date,
        first = %first,
        second = %second,
        "ambiguous local midnight; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "midnight of {date} does not \
         exist in configured timezone"
      ))
    }
  }
}

fn resolve_project_timezone() -> Tz {
  let from_env =
    std::env::var(TIMEZONE_ENV_VAR)
      .ok()
      .map(|raw| {
        (TIMEZONE_ENV_VAR.to_string(), raw)
      });
  let from_file =
    timezone_config_path().and_then(
      |path| {
        let raw =
          timezone_from_file(&path)?;
        Some((
          format!(
            "file:{}",
            path.display()
          ),
          raw
        ))
      }
    );

  from_env
    .into_iter()
    .chain(from_file)
    .find_map(|(source, raw)| {
      parse_timezone(&raw, &source)
    })
    .unwrap_or_else(|| {
      tracing::debug!(
        timezone = DEFAULT_PROJECT_TIMEZONE,
        "no project timezone configured"
      );
      chrono_tz::UTC
    })
}

fn timezone_config_path()
-> Option<PathBuf> {
  match std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    | Ok(raw) if !raw.trim().is_empty() => {
      Some(PathBuf::from(raw.trim()))
    }
    | _ => std::env::current_dir()
      .ok()
      .map(|dir| {
        dir.join(TIMEZONE_CONFIG_FILE)
      })
  }
}

/// Reads the `timezone` key, top level first, then under `[time]`.
fn timezone_from_file(
  path: &Path
) -> Option<String> {
  let raw =
    fs::read_to_string(path).ok()?;

  let parsed: TimezoneConfig =
    match toml::from_str(&raw) {
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

  let timezone = parsed
    .timezone
    .or_else(|| {
      parsed
        .time
        .and_then(|section| section.timezone)
    });
  if timezone.is_none() {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
  }
  timezone
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

  trimmed
    .parse::<Tz>()
    .inspect(|_| {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
    })
    .map_err(|err| {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
    })
    .ok()
}

/// Parses a user-supplied due date into a calendar day.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = to_project_date(now);

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return today
        .succ_opt()
        .ok_or_else(|| {
          anyhow!(
            "date out of range"
          )
        });
    }
    | "yesterday" => {
      return today
        .pred_opt()
        .ok_or_else(|| {
          anyhow!(
            "date out of range"
          )
        });
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today,
      target_weekday
    ));
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
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
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let duration = match unit {
      | "d" => Duration::try_days(num),
      | "w" => Duration::try_weeks(num),
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ))
      }
    };

    let shifted = duration.and_then(|duration| {
      if sign == "-" {
        today.checked_sub_signed(duration)
      } else {
        today.checked_add_signed(duration)
      }
    });
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative date out of range: \
         {input}"
      )
    });
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  if let Some((month, day)) =
    parse_month_day(token)
  {
    return NaiveDate::from_ymd_opt(
      today.year(),
      month,
      day
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid month/day: {input}"
      )
    });
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(to_project_date(
      dt.with_timezone(&Utc)
    ));
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday, weekday \
     names (e.g. monday), +Nd/-Nd/+Nw, \
     YYYY-MM-DD, M/D, RFC3339"
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
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

fn parse_month_day(
  token: &str
) -> Option<(u32, u32)> {
  let (month, day) =
    token.split_once('/')?;
  let month =
    month.trim().parse::<u32>().ok()?;
  let day =
    day.trim().parse::<u32>().ok()?;
  Some((month, day))
}
