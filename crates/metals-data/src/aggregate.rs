//! 세션 범위 집계 엔진.
//!
//! 읽기 경로의 집계 요청을 처리합니다. 단계 순서:
//!
//! 1. 슬롯의 현재 계약월 라벨 해석 (호출자 라벨은 신뢰하지 않음)
//! 2. 해당 라벨의 범위 조회
//! 3. 세션 윈도우로 클리핑 (개장 전 조회는 직전 세션으로 대체)
//! 4. 같은 분(minute)의 중복 타임스탬프 붕괴 — 마지막 관측값 유지
//! 5. count/min/max/avg/first/last/delta/delta% 계산
//!
//! 클리핑 후 포인트가 없는 것은 에러가 아닙니다. 거래 시간 외에는
//! 그것이 정상 상태이므로 count=0의 0 결과를 반환합니다.

use chrono::{DateTime, Utc};
use metals_core::{
    AggregateResult, InstrumentKey, Metal, MonthSlot, QuoteSnapshot, TradingCalendar,
    TradingSession,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::storage::QuoteRepository;

/// 집계 요청.
#[derive(Debug, Clone)]
pub struct AggregateQuery {
    /// 금속
    pub metal: Metal,
    /// 계약월 슬롯 (None이면 현물)
    pub slot: Option<MonthSlot>,
    /// 명시적 범위 시작 (없으면 현재 조회 세션)
    pub range_start: Option<DateTime<Utc>>,
    /// 명시적 범위 끝
    pub range_end: Option<DateTime<Utc>>,
    /// 최대 포인트 수
    pub limit: Option<i64>,
}

/// 시계열 포인트.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// 관측 시각
    pub time: DateTime<Utc>,
    /// 가격
    pub value: Decimal,
}

/// 집계 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregateStatus {
    Ok,
    NoDataForWindow,
}

impl AggregateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateStatus::Ok => "ok",
            AggregateStatus::NoDataForWindow => "no-data-for-window",
        }
    }
}

/// 집계 결과 시리즈.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateSeries {
    /// 해석된 인스트루먼트 (현재 라벨 반영)
    pub instrument: InstrumentKey,
    /// 붕괴 후 시계열 포인트
    pub points: Vec<SeriesPoint>,
    /// 통계
    pub stats: AggregateResult,
    /// 상태
    pub status: AggregateStatus,
}

/// 집계 엔진.
#[derive(Clone)]
pub struct AggregationEngine {
    repo: QuoteRepository,
    calendar: TradingCalendar,
}

impl AggregationEngine {
    /// 새 엔진을 생성합니다.
    pub fn new(repo: QuoteRepository, calendar: TradingCalendar) -> Self {
        Self { repo, calendar }
    }

    /// 캘린더를 반환합니다.
    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    /// 세션 범위 집계를 수행합니다.
    pub async fn aggregate(
        &self,
        query: &AggregateQuery,
        now: DateTime<Utc>,
    ) -> Result<AggregateSeries> {
        // 기본 범위는 현재 조회 세션. 명시적 범위는 범위 끝 시각이
        // 속한 세션으로 클리핑한다 (과거 범위 조회가 오늘 세션에
        // 잘려나가지 않도록).
        let session = match query.range_end {
            Some(end) => self.calendar.query_session(end),
            None => self.calendar.query_session(now),
        };
        let range_start = query.range_start.unwrap_or(session.start);
        let range_end = query.range_end.unwrap_or(session.end);

        // 1. 현재 라벨 해석 — 롤 테이블이 비어 있으면 데이터 없음
        let instrument = match self.resolve_instrument(query).await? {
            Some(instrument) => instrument,
            None => {
                debug!(metal = %query.metal, slot = ?query.slot, "롤 상태 없음");
                return Ok(AggregateSeries {
                    instrument: InstrumentKey::spot(query.metal),
                    points: Vec::new(),
                    stats: AggregateResult::empty(range_start, range_end),
                    status: AggregateStatus::NoDataForWindow,
                });
            }
        };

        // 2. 범위 조회
        let rows = self
            .repo
            .range(&instrument, range_start, range_end, query.limit)
            .await?;
        let snapshots: Vec<QuoteSnapshot> =
            rows.iter().filter_map(|r| r.to_snapshot().ok()).collect();

        // 3-4. 세션 클리핑 + 분 단위 붕괴
        let clipped = clip_to_session(snapshots, &session);
        let collapsed = collapse_minutes(clipped);

        // 5. 통계 계산
        let stats = compute(&collapsed, range_start, range_end);
        let status = if stats.has_data() {
            AggregateStatus::Ok
        } else {
            AggregateStatus::NoDataForWindow
        };

        let points = collapsed
            .into_iter()
            .map(|s| SeriesPoint {
                time: s.observed_at,
                value: s.price,
            })
            .collect();

        Ok(AggregateSeries {
            instrument,
            points,
            stats,
            status,
        })
    }

    /// 요청의 슬롯을 현재 계약월 라벨로 해석합니다.
    async fn resolve_instrument(&self, query: &AggregateQuery) -> Result<Option<InstrumentKey>> {
        match query.slot {
            None => Ok(Some(InstrumentKey::spot(query.metal))),
            Some(slot) => {
                let label = self.repo.current_label(query.metal, slot).await?;
                Ok(label.map(|label| InstrumentKey::contract(query.metal, label)))
            }
        }
    }
}

// =============================================================================
// 순수 집계 단계
// =============================================================================

/// 세션 윈도우 밖의 포인트를 제거합니다.
pub fn clip_to_session(
    points: Vec<QuoteSnapshot>,
    session: &TradingSession,
) -> Vec<QuoteSnapshot> {
    points
        .into_iter()
        .filter(|p| session.contains(p.observed_at))
        .collect()
}

/// 같은 분(minute)의 중복 타임스탬프를 붕괴합니다.
///
/// 수집 경쟁이나 재시도된 폴이 카운트를 부풀리거나 평균을 왜곡하면
/// 안 되므로, 분당 마지막 관측값만 유지합니다.
pub fn collapse_minutes(mut points: Vec<QuoteSnapshot>) -> Vec<QuoteSnapshot> {
    points.sort_by_key(|p| p.observed_at);

    let mut out: Vec<QuoteSnapshot> = Vec::with_capacity(points.len());
    for point in points {
        match out.last_mut() {
            Some(last) if minute_key(last.observed_at) == minute_key(point.observed_at) => {
                *last = point;
            }
            _ => out.push(point),
        }
    }
    out
}

/// 붕괴된 시계열의 통계를 계산합니다.
///
/// 빈 시리즈는 count=0의 0 결과를 반환합니다. `first == 0`이면
/// `delta_percent`는 0입니다 (0으로 나누지 않음).
pub fn compute(
    points: &[QuoteSnapshot],
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> AggregateResult {
    let Some(first_point) = points.first() else {
        return AggregateResult::empty(range_start, range_end);
    };
    let Some(last_point) = points.last() else {
        return AggregateResult::empty(range_start, range_end);
    };

    let mut min = first_point.price;
    let mut max = first_point.price;
    let mut sum = Decimal::ZERO;
    for point in points {
        min = min.min(point.price);
        max = max.max(point.price);
        sum += point.price;
    }

    let count = points.len() as u64;
    let avg = sum / Decimal::from(count);
    let first = first_point.price;
    let last = last_point.price;
    let delta = last - first;
    let delta_percent = if first.is_zero() {
        Decimal::ZERO
    } else {
        delta / first * Decimal::ONE_HUNDRED
    };

    AggregateResult {
        count,
        min,
        max,
        avg,
        first,
        last,
        delta,
        delta_percent,
        range_start,
        range_end,
    }
}

/// 분 해상도 키.
fn minute_key(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(60)
}

// =============================================================================
// 테스트
// =============================================================================
