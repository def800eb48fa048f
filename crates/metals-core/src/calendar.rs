//! 거래 캘린더 및 세션 윈도우.
//!
//! "지금 수집해도 되는가"와 "오늘의 거래 세션 윈도우는 언제인가"에
//! 답하는 순수 컴포넌트입니다. 세션 경계를 잘라내는 모든 조회는
//! 반드시 이 모듈의 `session_window`를 사용해야 하며, 엔드포인트마다
//! 경계 정책을 따로 구현하면 안 됩니다.
//!
//! 경계 정책: 시작은 닫힌 경계, 종료는 폐장 분(minute) 전체를 포함
//! (내부적으로는 폐장시각+1분의 반열린 구간). 예: 폐장 23:30이면
//! 23:30:59 관측값은 세션 안, 23:31:00은 밖입니다.
//!
//! 시간대 계산은 chrono-tz를 통해서만 수행합니다. 수동 시간 오프셋
//! 상수는 사용하지 않습니다.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::{env_var_or, parse_hhmm};
use crate::error::{EngineError, EngineResult};

/// 거래 캘린더 정책.
///
/// 인스트루먼트별 하드코딩이 아니라 설정으로 주입됩니다.
/// 휴장일 캘린더는 모델링하지 않습니다 (주중 공휴일에는 평소대로
/// 수집/서빙하며, 거래소 휴일 지원은 설정 공백으로 남겨둡니다).
#[derive(Debug, Clone)]
pub struct CalendarPolicy {
    /// IANA 시간대
    pub timezone: Tz,
    /// 거래 요일 집합
    pub weekdays: Vec<Weekday>,
    /// 개장 시각 (로컬)
    pub open: NaiveTime,
    /// 폐장 시각 (로컬, 해당 분 전체 포함)
    pub close: NaiveTime,
}

impl Default for CalendarPolicy {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Kolkata,
            weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(23, 30, 0).unwrap(),
        }
    }
}

impl CalendarPolicy {
    /// 환경변수에서 정책을 로드합니다.
    ///
    /// - `MARKET_TIMEZONE` (기본: "Asia/Kolkata")
    /// - `MARKET_OPEN` (기본: "09:00")
    /// - `MARKET_CLOSE` (기본: "23:30")
    /// - `MARKET_WEEKDAYS` (기본: "mon,tue,wed,thu,fri")
    pub fn from_env() -> EngineResult<Self> {
        let tz_str = env_var_or("MARKET_TIMEZONE", "Asia/Kolkata");
        let timezone: Tz = tz_str
            .parse()
            .map_err(|_| EngineError::Config(format!("알 수 없는 시간대: {}", tz_str)))?;

        let open = parse_hhmm(&env_var_or("MARKET_OPEN", "09:00"))?;
        let close = parse_hhmm(&env_var_or("MARKET_CLOSE", "23:30"))?;

        let weekdays_str = env_var_or("MARKET_WEEKDAYS", "mon,tue,wed,thu,fri");
        let weekdays = parse_weekdays(&weekdays_str)?;

        Ok(Self {
            timezone,
            weekdays,
            open,
            close,
        })
    }
}

/// 거래 요일 문자열 파싱 (예: "mon,tue,fri").
fn parse_weekdays(s: &str) -> EngineResult<Vec<Weekday>> {
    let mut days = Vec::new();
    for part in s.split(',') {
        let day = match part.trim().to_lowercase().as_str() {
            "mon" => Weekday::Mon,
            "tue" => Weekday::Tue,
            "wed" => Weekday::Wed,
            "thu" => Weekday::Thu,
            "fri" => Weekday::Fri,
            "sat" => Weekday::Sat,
            "sun" => Weekday::Sun,
            other => {
                return Err(EngineError::Config(format!("알 수 없는 요일: {}", other)));
            }
        };
        if !days.contains(&day) {
            days.push(day);
        }
    }
    if days.is_empty() {
        return Err(EngineError::Config("거래 요일이 비어 있습니다".to_string()));
    }
    Ok(days)
}

/// 파생 거래 세션 (저장되지 않음).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingSession {
    /// 세션 날짜 (거래소 로컬 기준)
    pub date: NaiveDate,
    /// 세션 시작 (UTC, 포함)
    pub start: DateTime<Utc>,
    /// 세션 끝 (UTC, 미포함 — 폐장 분의 다음 분 00초)
    pub end: DateTime<Utc>,
}

impl TradingSession {
    /// 주어진 시각이 세션 안에 있는지 확인합니다.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// 수집 게이트 차단 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateReason {
    Weekend,
    OutsideHours,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::Weekend => "weekend",
            GateReason::OutsideHours => "outside-hours",
        }
    }
}

/// 수집 게이트 판정.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// 수집 허용 여부
    pub allowed: bool,
    /// 차단 사유 (허용이면 None)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<GateReason>,
}

impl GateDecision {
    fn open() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn blocked(reason: GateReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// 거래 캘린더.
#[derive(Debug, Clone, Default)]
pub struct TradingCalendar {
    policy: CalendarPolicy,
}

impl TradingCalendar {
    /// 정책으로 캘린더를 생성합니다.
    pub fn new(policy: CalendarPolicy) -> Self {
        Self { policy }
    }

    /// 정책을 반환합니다.
    pub fn policy(&self) -> &CalendarPolicy {
        &self.policy
    }

    /// 해당 날짜가 거래일인지 확인합니다.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.policy.weekdays.contains(&date.weekday())
    }

    /// 지금 수집이 허용되는지 판정합니다.
    pub fn gate(&self, now: DateTime<Utc>) -> GateDecision {
        let local_date = now.with_timezone(&self.policy.timezone).date_naive();

        if !self.is_trading_day(local_date) {
            return GateDecision::blocked(GateReason::Weekend);
        }

        if self.session_window(local_date).contains(now) {
            GateDecision::open()
        } else {
            GateDecision::blocked(GateReason::OutsideHours)
        }
    }

    /// 해당 날짜의 세션 윈도우를 반환합니다.
    ///
    /// 종료 인스턴트는 폐장 분의 다음 분 00초입니다. 폐장 23:30이면
    /// `[09:00:00, 23:31:00)` — 23:30:59 관측값까지 세션에 포함됩니다.
    pub fn session_window(&self, date: NaiveDate) -> TradingSession {
        let start_local = date.and_time(self.policy.open);
        let end_local = date.and_time(self.policy.close) + Duration::minutes(1);

        TradingSession {
            date,
            start: self.localize(start_local),
            end: self.localize(end_local),
        }
    }

    /// 조회에 사용할 세션을 결정합니다.
    ///
    /// 오늘이 거래일이고 이미 개장 시각을 지났으면 오늘 세션을
    /// 반환합니다 (폐장 후에도 오늘 세션 — 대시보드는 당일 마감
    /// 세션을 계속 보여줍니다). 개장 전이거나 비거래일이면 직전
    /// 거래일 세션으로 대체합니다 (월요일 개장 전 → 금요일 세션).
    pub fn query_session(&self, now: DateTime<Utc>) -> TradingSession {
        let local_date = now.with_timezone(&self.policy.timezone).date_naive();

        if self.is_trading_day(local_date) {
            let window = self.session_window(local_date);
            if now >= window.start {
                return window;
            }
        }

        self.session_window(self.previous_trading_day(local_date))
    }

    /// 주어진 날짜 직전의 거래일을 반환합니다.
    pub fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut candidate = date - Duration::days(1);
        // 요일 집합이 비어있지 않으므로 최대 7일 안에 반드시 찾는다
        for _ in 0..7 {
            if self.is_trading_day(candidate) {
                return candidate;
            }
            candidate -= Duration::days(1);
        }
        candidate
    }

    /// 로컬 시각을 UTC 인스턴트로 변환합니다.
    fn localize(&self, local: chrono::NaiveDateTime) -> DateTime<Utc> {
        match self.policy.timezone.from_local_datetime(&local) {
            LocalResult::Single(t) => t.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            // DST 갭에 걸린 시각은 한 시간 뒤로 해석
            LocalResult::None => self
                .policy
                .timezone
                .from_local_datetime(&(local + Duration::hours(1)))
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&local)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ist(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        chrono_tz::Asia::Kolkata
            .with_ymd_and_hms(y, m, d, h, min, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn calendar() -> TradingCalendar {
        TradingCalendar::new(CalendarPolicy::default())
    }

    #[test]
    fn test_weekend_blocked() {
        // 2025-03-01은 토요일, 2025-03-02는 일요일
        let saturday = calendar().gate(ist(2025, 3, 1, 12, 0, 0));
        assert!(!saturday.allowed);
        assert_eq!(saturday.reason, Some(GateReason::Weekend));

        let sunday = calendar().gate(ist(2025, 3, 2, 12, 0, 0));
        assert_eq!(sunday.reason, Some(GateReason::Weekend));
    }

    #[test]
    fn test_weekday_in_session_allowed() {
        // 2025-03-04는 화요일
        let decision = calendar().gate(ist(2025, 3, 4, 10, 0, 0));
        assert!(decision.allowed);
        assert_eq!(decision.reason, None);
    }

    #[test]
    fn test_before_open_blocked() {
        let decision = calendar().gate(ist(2025, 3, 4, 8, 59, 59));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(GateReason::OutsideHours));
    }

    #[test]
    fn test_open_boundary_inclusive() {
        let decision = calendar().gate(ist(2025, 3, 4, 9, 0, 0));
        assert!(decision.allowed);
    }

    #[test]
    fn test_close_minute_inclusive() {
        // 폐장 23:30 — 해당 분의 마지막 초까지 세션에 포함
        assert!(calendar().gate(ist(2025, 3, 4, 23, 30, 0)).allowed);
        assert!(calendar().gate(ist(2025, 3, 4, 23, 30, 59)).allowed);

        let after = calendar().gate(ist(2025, 3, 4, 23, 31, 0));
        assert!(!after.allowed);
        assert_eq!(after.reason, Some(GateReason::OutsideHours));
    }

    #[test]
    fn test_session_window_bounds() {
        let window = calendar().session_window(NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
        assert_eq!(window.start, ist(2025, 3, 4, 9, 0, 0));
        assert_eq!(window.end, ist(2025, 3, 4, 23, 31, 0));
        assert!(window.contains(ist(2025, 3, 4, 23, 30, 59)));
        assert!(!window.contains(ist(2025, 3, 4, 23, 31, 0)));
    }

    #[test]
    fn test_monday_preopen_falls_back_to_friday() {
        // 2025-03-03 월요일 08:00 — 금요일(2025-02-28) 세션으로 대체
        let session = calendar().query_session(ist(2025, 3, 3, 8, 0, 0));
        assert_eq!(session.date, NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }

    #[test]
    fn test_saturday_falls_back_to_friday() {
        let session = calendar().query_session(ist(2025, 3, 1, 15, 0, 0));
        assert_eq!(session.date, NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }

    #[test]
    fn test_after_close_keeps_today() {
        // 폐장 후에도 당일 세션 유지
        let session = calendar().query_session(ist(2025, 3, 4, 23, 45, 0));
        assert_eq!(session.date, NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
    }

    #[test]
    fn test_parse_weekdays() {
        let days = parse_weekdays("mon, tue ,fri").unwrap();
        assert_eq!(days, vec![Weekday::Mon, Weekday::Tue, Weekday::Fri]);
        assert!(parse_weekdays("mon,xyz").is_err());
        assert!(parse_weekdays("").is_err());
    }
}
