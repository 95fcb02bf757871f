//! Temporal Index (C4, spec §4.4).
//!
//! Multi-resolution time keys (`year`, `iso_week`, `day_of_week`,
//! `hour_bucket`) backed by a `RoaringBitmap` per `(level, bucket)`, plus a
//! phrase-to-range parser for a closed set of English temporal phrases and
//! a per-episode feature extractor (`recency`, circadian sin/cos pairs).
//!
//! Episode ids are opaque strings (ULIDs); `RoaringBitmap` needs `u32`
//! keys, so this module keeps a small surrogate-id table alongside the
//! bitmaps, the same role a secondary index plays in the teacher's SQLite
//! schema.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;
use roaring::RoaringBitmap;

use crate::error::{Classify, ErrorKind};
use crate::ids::Timestamp;

#[derive(Debug, thiserror::Error)]
pub enum TemporalError {
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
}

impl Classify for TemporalError {
    fn kind(&self) -> ErrorKind {
        match self {
            TemporalError::UnknownTimezone(_) => ErrorKind::InvariantViolation,
        }
    }
}

pub type Result<T> = std::result::Result<T, TemporalError>;

/// Six-slot hour bucket, collapsed per spec §4.4: `0–3, 3–6, 6–12, 12–18,
/// 18–23, 23–24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HourBucket {
    LateNight,  // 0-3
    EarlyMorning, // 3-6
    Morning,    // 6-12
    Afternoon,  // 12-18
    Evening,    // 18-23
    LastHour,   // 23-24
}

impl HourBucket {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=2 => HourBucket::LateNight,
            3..=5 => HourBucket::EarlyMorning,
            6..=11 => HourBucket::Morning,
            12..=17 => HourBucket::Afternoon,
            18..=22 => HourBucket::Evening,
            _ => HourBucket::LastHour,
        }
    }

    fn as_u32(self) -> u32 {
        self as u32
    }
}

/// `{year, iso_week, day_of_week, hour_bucket}` computed in the space's
/// local calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalKey {
    pub year: i32,
    pub iso_week: u32,
    pub day_of_week: chrono::Weekday,
    pub hour_bucket: HourBucket,
}

impl TemporalKey {
    pub fn of(local: &chrono::DateTime<Tz>) -> Self {
        let iso = local.iso_week();
        Self {
            year: iso.year(),
            iso_week: iso.week(),
            day_of_week: local.weekday(),
            hour_bucket: HourBucket::from_hour(local.hour()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Level {
    Year,
    IsoWeek,
    DayOfWeek,
    HourBucket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BucketKey(Level, u32);

fn weekday_to_u32(w: chrono::Weekday) -> u32 {
    w.num_days_from_monday()
}

/// Recency/circadian feature set for one episode at query time (spec §4.4
/// `features`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalFeatures {
    pub recency: f64,
    pub sin_tod: f64,
    pub cos_tod: f64,
    pub sin_dow: f64,
    pub cos_dow: f64,
    pub is_weekend: bool,
}

/// Result of [`TemporalIndex::phrase_to_range`].
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseRange {
    pub from: Timestamp,
    pub to: Timestamp,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

struct Inner {
    /// (level, bucket) -> episodes present at that bucket.
    buckets: HashMap<BucketKey, RoaringBitmap>,
    /// Episode surrogate-id table: the RoaringBitmap payload, and the
    /// reverse lookup used when decoding a `slice` result back to an
    /// episode id string.
    id_of: HashMap<String, u32>,
    episode_of_id: Vec<String>,
    ts_of: HashMap<String, Timestamp>,
}

impl Inner {
    fn surrogate(&mut self, episode_id: &str) -> u32 {
        if let Some(&id) = self.id_of.get(episode_id) {
            return id;
        }
        let id = self.episode_of_id.len() as u32;
        self.episode_of_id.push(episode_id.to_string());
        self.id_of.insert(episode_id.to_string(), id);
        id
    }
}

/// Per-space multi-resolution temporal index.
pub struct TemporalIndex {
    tz: Tz,
    half_life_hours: f64,
    inner: RwLock<Inner>,
}

impl TemporalIndex {
    pub fn new(tz_name: &str, half_life_hours: f64) -> Result<Self> {
        let tz: Tz = tz_name
            .parse()
            .map_err(|_| TemporalError::UnknownTimezone(tz_name.to_string()))?;
        Ok(Self {
            tz,
            half_life_hours,
            inner: RwLock::new(Inner {
                buckets: HashMap::new(),
                id_of: HashMap::new(),
                episode_of_id: Vec::new(),
                ts_of: HashMap::new(),
            }),
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Insert `episode_id` into every level's bucket for `ts`, and record
    /// its exact timestamp for `slice`'s intersection step. O(log n) per
    /// level (RoaringBitmap insert).
    pub fn ingest(&self, episode_id: &str, ts: Timestamp) {
        let local = ts.with_timezone(&self.tz);
        let key = TemporalKey::of(&local);
        let mut inner = self.inner.write();
        let sid = inner.surrogate(episode_id);
        inner.ts_of.insert(episode_id.to_string(), ts);
        for bucket_key in [
            BucketKey(Level::Year, key.year as u32),
            BucketKey(Level::IsoWeek, key.iso_week),
            BucketKey(Level::DayOfWeek, weekday_to_u32(key.day_of_week)),
            BucketKey(Level::HourBucket, key.hour_bucket.as_u32()),
        ] {
            inner.buckets.entry(bucket_key).or_default().insert(sid);
        }
    }

    /// Decompose `[from, to)` to the minimum covering set of year buckets,
    /// union their bitmaps, then intersect against the exact per-episode
    /// timestamp for exactness (spec §4.4 `slice`).
    pub fn slice(&self, from: Timestamp, to: Timestamp) -> Vec<String> {
        let inner = self.inner.read();
        let mut candidates = RoaringBitmap::new();
        let from_local = from.with_timezone(&self.tz);
        let to_local = to.with_timezone(&self.tz);
        let start_year = from_local.year();
        let end_year = to_local.year();
        for year in start_year..=end_year {
            if let Some(bm) = inner.buckets.get(&BucketKey(Level::Year, year as u32)) {
                candidates |= bm;
            }
        }
        let mut out = Vec::new();
        for sid in candidates.iter() {
            let Some(episode_id) = inner.episode_of_id.get(sid as usize) else {
                continue;
            };
            if let Some(&ts) = inner.ts_of.get(episode_id) {
                if ts >= from && ts < to {
                    out.push(episode_id.clone());
                }
            }
        }
        out.sort();
        out
    }

    /// Filter by hour-bucket across the whole index (used by phrase hints
    /// like "morning" with no explicit date range).
    pub fn slice_by_hour_bucket(&self, bucket: HourBucket) -> Vec<String> {
        let inner = self.inner.read();
        let Some(bm) = inner.buckets.get(&BucketKey(Level::HourBucket, bucket.as_u32())) else {
            return Vec::new();
        };
        bm.iter()
            .filter_map(|sid| inner.episode_of_id.get(sid as usize).cloned())
            .collect()
    }

    /// Filter by day-of-week set across the whole index (used by
    /// `"weekend"`).
    pub fn slice_by_weekend(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for dow in [chrono::Weekday::Sat, chrono::Weekday::Sun] {
            if let Some(bm) = inner.buckets.get(&BucketKey(Level::DayOfWeek, weekday_to_u32(dow))) {
                out.extend(bm.iter().filter_map(|sid| inner.episode_of_id.get(sid as usize).cloned()));
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// `recency = 2^(-Δt_hours / h)` plus circadian sin/cos features (spec
    /// §4.4, §8 property 6).
    pub fn features(&self, episode_id: &str, now: Timestamp) -> Option<TemporalFeatures> {
        let inner = self.inner.read();
        let ts = *inner.ts_of.get(episode_id)?;
        drop(inner);
        Some(self.features_for_ts(ts, now))
    }

    pub fn features_for_ts(&self, ts: Timestamp, now: Timestamp) -> TemporalFeatures {
        let delta_hours = (now - ts).num_milliseconds() as f64 / 3_600_000.0;
        let recency = 2f64.powf(-delta_hours.max(0.0) / self.half_life_hours);
        let local = ts.with_timezone(&self.tz);
        let hour_frac = local.hour() as f64 + local.minute() as f64 / 60.0;
        let tod_angle = 2.0 * std::f64::consts::PI * (hour_frac / 24.0);
        let dow_angle = 2.0 * std::f64::consts::PI * (weekday_to_u32(local.weekday()) as f64 / 7.0);
        TemporalFeatures {
            recency,
            sin_tod: tod_angle.sin(),
            cos_tod: tod_angle.cos(),
            sin_dow: dow_angle.sin(),
            cos_dow: dow_angle.cos(),
            is_weekend: matches!(local.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun),
        }
    }

    /// Parse a closed set of English temporal phrases into a `[from, to)`
    /// range plus a confidence and reasons trail (spec §4.4
    /// `phrase_to_range`). Unknown phrases return `None`.
    pub fn phrase_to_range(&self, phrase: &str, now: Timestamp) -> Option<PhraseRange> {
        let local_now = now.with_timezone(&self.tz);
        let p = phrase.trim().to_lowercase();

        let day_range = |local: DateTime<Tz>| -> (Timestamp, Timestamp) {
            let start = local
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_local_timezone(self.tz)
                .single()
                .unwrap_or(local);
            (start.with_timezone(&Utc), (start + Duration::days(1)).with_timezone(&Utc))
        };

        match p.as_str() {
            "today" => {
                let (from, to) = day_range(local_now);
                return Some(PhraseRange { from, to, confidence: 1.0, reasons: vec!["phrase:today→range".to_string()] });
            }
            "yesterday" => {
                let (from, to) = day_range(local_now - Duration::days(1));
                return Some(PhraseRange { from, to, confidence: 1.0, reasons: vec!["phrase:yesterday→range".to_string()] });
            }
            "tomorrow" => {
                let (from, to) = day_range(local_now + Duration::days(1));
                return Some(PhraseRange { from, to, confidence: 1.0, reasons: vec!["phrase:tomorrow→range".to_string()] });
            }
            "weekend" => {
                return Some(PhraseRange {
                    from: now - Duration::days(90),
                    to: now,
                    confidence: 0.4,
                    reasons: vec!["phrase:weekend→dow-filter".to_string()],
                });
            }
            "morning" | "afternoon" | "evening" | "night" => {
                return Some(PhraseRange {
                    from: now - Duration::days(90),
                    to: now,
                    confidence: 0.4,
                    reasons: vec![format!("phrase:{p}→hour_bucket-filter")],
                });
            }
            _ => {}
        }

        if let Some(rest) = p.strip_prefix("last ").or_else(|| p.strip_prefix("this ")).or_else(|| p.strip_prefix("next ")) {
            let quantifier = if p.starts_with("last") { -1i64 } else if p.starts_with("next") { 1i64 } else { 0i64 };

            if let Some(weekday) = parse_weekday(rest) {
                let target = nearest_weekday(local_now, weekday, quantifier);
                let (from, to) = day_range(target);
                return Some(PhraseRange {
                    from,
                    to,
                    confidence: 0.9,
                    reasons: vec![format!("phrase:{p}→range"), format!("half_life_h={}", self.half_life_hours)],
                });
            }

            if let Some((n, unit)) = parse_n_unit(rest) {
                let span = match unit {
                    "day" | "days" => Duration::days(n),
                    "week" | "weeks" => Duration::weeks(n),
                    "month" | "months" => Duration::days(n * 30),
                    _ => return None,
                };
                let (from, to) = match quantifier {
                    -1 => (now - span, now),
                    1 => (now, now + span),
                    _ => (now - span / 2, now + span / 2),
                };
                return Some(PhraseRange {
                    from,
                    to,
                    confidence: 0.85,
                    reasons: vec![format!("phrase:{p}→range")],
                });
            }
        }

        None
    }
}

fn parse_weekday(s: &str) -> Option<chrono::Weekday> {
    use chrono::Weekday::*;
    match s {
        "monday" => Some(Mon),
        "tuesday" => Some(Tue),
        "wednesday" => Some(Wed),
        "thursday" => Some(Thu),
        "friday" => Some(Fri),
        "saturday" => Some(Sat),
        "sunday" => Some(Sun),
        _ => None,
    }
}

/// Nearest past/next occurrence of `weekday` relative to `from`, per
/// `quantifier` (`-1` = nearest past, `1` = nearest upcoming, `0` = this
/// week's).
fn nearest_weekday(from: DateTime<Tz>, weekday: chrono::Weekday, quantifier: i64) -> DateTime<Tz> {
    let today_idx = weekday_to_u32(from.weekday()) as i64;
    let target_idx = weekday_to_u32(weekday) as i64;
    let delta = match quantifier {
        -1 => {
            let mut d = (target_idx - today_idx) % 7;
            if d >= 0 {
                d -= 7;
            }
            d
        }
        1 => {
            let mut d = (target_idx - today_idx) % 7;
            if d <= 0 {
                d += 7;
            }
            d
        }
        _ => target_idx - today_idx,
    };
    from + Duration::days(delta)
}

fn parse_n_unit(s: &str) -> Option<(i64, &str)> {
    let mut parts = s.splitn(2, ' ');
    let n: i64 = parts.next()?.parse().ok()?;
    let unit = parts.next()?;
    Some((n, unit))
}
