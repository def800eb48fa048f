//! 시세 Repository.
//!
//! 두 가지 저장 체계를 의도적으로 분리합니다:
//!
//! - **이력 시리즈** (`spot_quotes`/`futures_quotes`): 폴링 이력의
//!   append-only 저장. 삽입 전 중복 게이트가 스킵 여부를 결정합니다.
//! - **일자별 최신값** (`daily_quotes`): `(metal, contract_label,
//!   observed_date)` 자연키의 latest-wins upsert. 같은 날의 새 관측값이
//!   저장값을 교체합니다.
//!
//! 두 체계를 한 코드 경로로 합치면 이력이 사라지거나 저장소가
//! 불어나므로 별도 메서드로 유지합니다.

use chrono::{DateTime, NaiveDate, Utc};
use metals_core::{ContractLabel, InstrumentKey, Metal, MonthSlot, QuoteSnapshot, QuoteSource};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use crate::error::{DataError, Result};

/// 이력 시리즈 레코드.
#[derive(Debug, Clone, FromRow)]
pub struct QuoteRow {
    pub metal: String,
    pub contract_label: String,
    pub price: Decimal,
    pub delta: Option<Decimal>,
    pub delta_percent: Option<Decimal>,
    pub source: String,
    pub observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl QuoteRow {
    /// 도메인 스냅샷으로 변환합니다.
    pub fn to_snapshot(&self) -> Result<QuoteSnapshot> {
        let metal: Metal = self
            .metal
            .parse()
            .map_err(|_| DataError::InvalidData(format!("알 수 없는 금속 레코드: {}", self.metal)))?;

        let contract = match self.contract_label.as_str() {
            "spot" => None,
            label => Some(
                ContractLabel::new(label).map_err(|_| {
                    DataError::InvalidData(format!("잘못된 계약월 레코드: {}", label))
                })?,
            ),
        };

        let source = self
            .source
            .parse::<QuoteSource>()
            .unwrap_or(QuoteSource::ScheduledPoll);

        Ok(QuoteSnapshot {
            instrument: InstrumentKey { metal, contract },
            observed_at: self.observed_at,
            price: self.price,
            delta: self.delta,
            delta_percent: self.delta_percent,
            source,
        })
    }
}

/// 시세 Repository.
#[derive(Clone)]
pub struct QuoteRepository {
    pool: PgPool,
}

impl QuoteRepository {
    /// 새 Repository를 생성합니다.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 연결 풀을 반환합니다.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 이력 시리즈에 스냅샷들을 삽입합니다.
    ///
    /// 한 스냅샷 집합에서 나온 행 전체를 단일 트랜잭션으로 기록합니다.
    /// 부분 기록은 없습니다.
    pub async fn insert_history(&self, snapshots: &[QuoteSnapshot]) -> Result<usize> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        for snap in snapshots {
            match &snap.instrument.contract {
                Some(label) => {
                    sqlx::query(
                        r#"
                        INSERT INTO futures_quotes
                            (metal, contract_label, price, delta, delta_percent, source, observed_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7)
                        "#,
                    )
                    .bind(snap.instrument.metal.code())
                    .bind(label.as_str())
                    .bind(snap.price)
                    .bind(snap.delta)
                    .bind(snap.delta_percent)
                    .bind(snap.source.as_str())
                    .bind(snap.observed_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| DataError::InsertError(e.to_string()))?;
                }
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO spot_quotes
                            (metal, price, delta, delta_percent, source, observed_at)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        "#,
                    )
                    .bind(snap.instrument.metal.code())
                    .bind(snap.price)
                    .bind(snap.delta)
                    .bind(snap.delta_percent)
                    .bind(snap.source.as_str())
                    .bind(snap.observed_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| DataError::InsertError(e.to_string()))?;
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;

        debug!(count = snapshots.len(), "이력 스냅샷 저장");
        Ok(snapshots.len())
    }

    /// 중복 게이트용: 같은 출처 범위의 최근 레코드를 조회합니다.
    pub async fn recent_by_source(
        &self,
        instrument: &InstrumentKey,
        source: QuoteSource,
        since: DateTime<Utc>,
    ) -> Result<Vec<QuoteRow>> {
        let rows: Vec<QuoteRow> = match &instrument.contract {
            Some(label) => sqlx::query_as(
                r#"
                SELECT metal, contract_label, price, delta, delta_percent, source,
                       observed_at, created_at
                FROM futures_quotes
                WHERE metal = $1 AND contract_label = $2 AND source = $3 AND created_at >= $4
                ORDER BY created_at DESC
                "#,
            )
            .bind(instrument.metal.code())
            .bind(label.as_str())
            .bind(source.as_str())
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?,
            None => sqlx::query_as(
                r#"
                SELECT metal, 'spot' AS contract_label, price, delta, delta_percent, source,
                       observed_at, created_at
                FROM spot_quotes
                WHERE metal = $1 AND source = $2 AND created_at >= $3
                ORDER BY created_at DESC
                "#,
            )
            .bind(instrument.metal.code())
            .bind(source.as_str())
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?,
        };

        Ok(rows)
    }

    /// 시간 범위의 이력 레코드를 조회합니다 (observed_at 오름차순).
    ///
    /// `limit`이 있으면 최신 `limit`개를 시간순으로 반환합니다.
    pub async fn range(
        &self,
        instrument: &InstrumentKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<i64>,
    ) -> Result<Vec<QuoteRow>> {
        let limit = limit.unwrap_or(10_000);

        let mut rows: Vec<QuoteRow> = match &instrument.contract {
            Some(label) => sqlx::query_as(
                r#"
                SELECT metal, contract_label, price, delta, delta_percent, source,
                       observed_at, created_at
                FROM futures_quotes
                WHERE metal = $1 AND contract_label = $2
                  AND observed_at >= $3 AND observed_at < $4
                ORDER BY observed_at DESC, created_at DESC
                LIMIT $5
                "#,
            )
            .bind(instrument.metal.code())
            .bind(label.as_str())
            .bind(start)
            .bind(end)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?,
            None => sqlx::query_as(
                r#"
                SELECT metal, 'spot' AS contract_label, price, delta, delta_percent, source,
                       observed_at, created_at
                FROM spot_quotes
                WHERE metal = $1 AND observed_at >= $2 AND observed_at < $3
                ORDER BY observed_at DESC, created_at DESC
                LIMIT $4
                "#,
            )
            .bind(instrument.metal.code())
            .bind(start)
            .bind(end)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?,
        };

        // 시간순 정렬 (오래된 것부터)
        rows.reverse();
        Ok(rows)
    }

    /// 인스트루먼트의 최신 레코드를 조회합니다.
    ///
    /// 다른 컴포넌트의 런타임 캐시를 읽는 대신 모든 reader가
    /// 직접 호출하는 명시적 조회 계층입니다.
    pub async fn latest(&self, instrument: &InstrumentKey) -> Result<Option<QuoteRow>> {
        let row: Option<QuoteRow> = match &instrument.contract {
            Some(label) => sqlx::query_as(
                r#"
                SELECT metal, contract_label, price, delta, delta_percent, source,
                       observed_at, created_at
                FROM futures_quotes
                WHERE metal = $1 AND contract_label = $2
                ORDER BY observed_at DESC, created_at DESC
                LIMIT 1
                "#,
            )
            .bind(instrument.metal.code())
            .bind(label.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?,
            None => sqlx::query_as(
                r#"
                SELECT metal, 'spot' AS contract_label, price, delta, delta_percent, source,
                       observed_at, created_at
                FROM spot_quotes
                WHERE metal = $1
                ORDER BY observed_at DESC, created_at DESC
                LIMIT 1
                "#,
            )
            .bind(instrument.metal.code())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?,
        };

        Ok(row)
    }

    /// 일자별 최신값을 upsert합니다 (latest-wins).
    ///
    /// 같은 날 같은 키의 새 관측값이 저장값을 교체합니다. 이 시리즈는
    /// 틱 이력이 아니라 "그날의 마지막 알려진 값"을 모델링합니다.
    pub async fn upsert_daily(
        &self,
        snapshot: &QuoteSnapshot,
        observed_date: NaiveDate,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_quotes
                (metal, contract_label, observed_date, price, delta, delta_percent,
                 source, observed_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (metal, contract_label, observed_date) DO UPDATE SET
                price = EXCLUDED.price,
                delta = EXCLUDED.delta,
                delta_percent = EXCLUDED.delta_percent,
                source = EXCLUDED.source,
                observed_at = EXCLUDED.observed_at,
                updated_at = NOW()
            "#,
        )
        .bind(snapshot.instrument.metal.code())
        .bind(snapshot.instrument.contract_code())
        .bind(observed_date)
        .bind(snapshot.price)
        .bind(snapshot.delta)
        .bind(snapshot.delta_percent)
        .bind(snapshot.source.as_str())
        .bind(snapshot.observed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DataError::InsertError(e.to_string()))?;

        Ok(())
    }

    /// 슬롯 -> 계약월 라벨 롤 상태를 upsert합니다.
    ///
    /// 라벨이 실제로 바뀐 경우에만 `rolled_at`을 갱신합니다.
    pub async fn upsert_rolls(
        &self,
        metal: Metal,
        rolls: &[(MonthSlot, ContractLabel)],
    ) -> Result<()> {
        for (slot, label) in rolls {
            sqlx::query(
                r#"
                INSERT INTO contract_month_rolls (metal, slot, contract_label, rolled_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (metal, slot) DO UPDATE SET
                    contract_label = EXCLUDED.contract_label,
                    rolled_at = NOW()
                WHERE contract_month_rolls.contract_label IS DISTINCT FROM EXCLUDED.contract_label
                "#,
            )
            .bind(metal.code())
            .bind(slot.as_str())
            .bind(label.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;
        }

        Ok(())
    }

    /// 슬롯의 현재 계약월 라벨을 해석합니다 (O(1) 참조 테이블).
    ///
    /// 라벨은 계약 만기마다 롤링되므로 호출자가 보관한 라벨은
    /// 신뢰하지 않고 항상 여기서 해석합니다.
    pub async fn current_label(
        &self,
        metal: Metal,
        slot: MonthSlot,
    ) -> Result<Option<ContractLabel>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT contract_label FROM contract_month_rolls
            WHERE metal = $1 AND slot = $2
            "#,
        )
        .bind(metal.code())
        .bind(slot.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DataError::QueryError(e.to_string()))?;

        match row {
            Some((label,)) => {
                let label = ContractLabel::new(label)
                    .map_err(|e| DataError::InvalidData(e.to_string()))?;
                Ok(Some(label))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(metal: &str, label: &str, source: &str) -> QuoteRow {
        QuoteRow {
            metal: metal.to_string(),
            contract_label: label.to_string(),
            price: dec!(245.30),
            delta: Some(dec!(-0.4)),
            delta_percent: Some(dec!(-0.17)),
            source: source.to_string(),
            observed_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_to_snapshot() {
        let snap = row("aluminium", "JAN25", "scheduled-poll").to_snapshot().unwrap();
        assert_eq!(snap.instrument.to_string(), "aluminium:JAN25");
        assert_eq!(snap.source, QuoteSource::ScheduledPoll);
        assert_eq!(snap.price, dec!(245.30));
    }

    #[test]
    fn test_spot_row_to_snapshot() {
        let snap = row("copper", "spot", "spot-feed").to_snapshot().unwrap();
        assert!(snap.instrument.contract.is_none());
    }

    #[test]
    fn test_unknown_metal_rejected() {
        assert!(row("vibranium", "spot", "spot-feed").to_snapshot().is_err());
    }

    #[test]
    fn test_unknown_source_defaults_to_poll() {
        let snap = row("zinc", "spot", "legacy-cron").to_snapshot().unwrap();
        assert_eq!(snap.source, QuoteSource::ScheduledPoll);
    }
}
