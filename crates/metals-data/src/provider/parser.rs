//! 이기종 피드 페이로드 파서.
//!
//! 업스트림은 세 가지 형태의 페이로드를 보냅니다:
//!
//! 1. 계약월 맵: `{"prices": {"JAN25": {"price": 245.30,
//!    "site_rate_change": "-0.4 (-0.17%)"}, ...}}`
//! 2. 현물 단일 객체: `{"spot_price": ..., "price_change": ...,
//!    "change_percentage": ..., "last_updated": ...}`
//! 3. 변동값 업데이트: `[{stockName, priceChange, timestamp}]` 배열 또는
//!    인스트루먼트명 키의 `{amount, sign, last_updated}` 맵
//!
//! 모두 같은 내부 타입으로 정규화됩니다. 개별 필드의 노이즈(파싱 불가
//! 변동 문자열, 누락 수치)는 수집을 중단시키지 않지만, 최상위
//! 페이로드가 JSON이 아니거나 인식 가능한 필드가 전혀 없으면 하드
//! 파싱 실패로 처리합니다 — 부분 적용은 없습니다.
//!
//! 누락/null 수치는 0으로 강제하지 않고 None("알 수 없음")으로
//! 유지합니다. 진짜 0 가격은 유효한 데이터입니다.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use metals_core::{ContractLabel, InstrumentKey, Metal, MonthSlot, QuoteSnapshot, QuoteSource};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::{DataError, Result};

lazy_static! {
    /// "<수치> (<부호 있는 퍼센트>%)" 형식의 변동 필드.
    static ref RATE_CHANGE_RE: Regex =
        Regex::new(r"([+-]?\d+(?:\.\d+)?)\s*\(\s*([+-]?\d+(?:\.\d+)?)\s*%\s*\)").unwrap();
}

/// 계약월 맵의 단일 항목.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractQuote {
    /// 계약월 라벨
    pub label: ContractLabel,
    /// 가격 (누락이면 None)
    pub price: Option<Decimal>,
    /// 변동
    pub delta: Option<Decimal>,
    /// 변동률 %
    pub delta_percent: Option<Decimal>,
}

/// 현물 단일 객체.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotQuote {
    pub price: Option<Decimal>,
    pub delta: Option<Decimal>,
    pub delta_percent: Option<Decimal>,
    pub observed_at: Option<DateTime<Utc>>,
}

/// 변동값 전용 업데이트 항목.
///
/// 가격 없이 부호 적용된 변동만 담습니다. 스냅샷으로 변환하려면
/// 저장소의 최신 기준가가 필요하므로 수집 주기에서 해석합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeQuote {
    /// 업스트림 인스트루먼트명
    pub name: String,
    /// 부호 적용된 변동
    pub delta: Option<Decimal>,
    pub observed_at: Option<DateTime<Utc>>,
}

/// 파싱된 피드 데이터.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedData {
    /// 계약월 맵 페이로드
    ContractMonths {
        quotes: Vec<ContractQuote>,
        /// 만기 오름차순으로 정렬된 슬롯 -> 라벨 바인딩
        rolls: Vec<(MonthSlot, ContractLabel)>,
        observed_at: Option<DateTime<Utc>>,
    },
    /// 현물 단일 객체
    Spot(SpotQuote),
    /// 변동값 전용 업데이트
    CompanyChanges(Vec<ChangeQuote>),
}

/// `"<num> (<num>%)"` 변동 문자열에서 (변동, 변동률) 쌍을 추출합니다.
///
/// 파싱 불가 문자열은 에러 없이 `(0, 0)`을 반환합니다. 업스트림
/// 노이즈가 유효한 가격의 수집을 중단시키면 안 됩니다.
pub fn parse_rate_change(raw: &str) -> (Decimal, Decimal) {
    RATE_CHANGE_RE
        .captures(raw)
        .and_then(|caps| {
            let delta = parse_signed_decimal(caps.get(1)?.as_str())?;
            let percent = parse_signed_decimal(caps.get(2)?.as_str())?;
            Some((delta, percent))
        })
        .unwrap_or((Decimal::ZERO, Decimal::ZERO))
}

/// 원본 페이로드를 파싱합니다.
///
/// JSON이 아니거나 인식 가능한 형태가 아니면 [`DataError::ParseError`]
/// (이번 주기 데이터 없음)로 처리됩니다.
pub fn parse_payload(raw: &[u8]) -> Result<FeedData> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| DataError::ParseError(format!("JSON이 아닌 페이로드: {}", e)))?;

    if let Some(prices) = value.get("prices").and_then(Value::as_object) {
        return Ok(parse_contract_map(prices, value.get("timestamp")));
    }

    if value.get("spot_price").is_some()
        || value.get("price_change").is_some()
        || value.get("change_percentage").is_some()
    {
        return Ok(FeedData::Spot(SpotQuote {
            price: opt_decimal(value.get("spot_price")),
            delta: opt_decimal(value.get("price_change")),
            delta_percent: opt_decimal(value.get("change_percentage")),
            observed_at: parse_timestamp(value.get("last_updated")),
        }));
    }

    if let Some(items) = value.as_array() {
        return Ok(FeedData::CompanyChanges(parse_change_list(items)));
    }

    if let Some(map) = value.as_object() {
        let looks_like_changes = map
            .values()
            .any(|v| v.get("amount").is_some() || v.get("sign").is_some());
        if looks_like_changes {
            return Ok(FeedData::CompanyChanges(parse_change_map(map)));
        }
    }

    Err(DataError::ParseError(
        "인식할 수 없는 페이로드: 기대하는 필드가 없습니다".to_string(),
    ))
}

/// 파싱된 피드를 시세 스냅샷으로 정규화합니다.
///
/// 가격이 없는 항목은 가격 시리즈에서 제외됩니다. 변동값 전용
/// 업데이트는 저장소 기준가가 필요하므로 여기서는 빈 목록을
/// 반환하고, 수집 주기가 별도로 해석합니다.
pub fn normalize_quotes(
    metal: Metal,
    feed: &FeedData,
    fetched_at: DateTime<Utc>,
    source: QuoteSource,
) -> Vec<QuoteSnapshot> {
    match feed {
        FeedData::ContractMonths {
            quotes,
            observed_at,
            ..
        } => quotes
            .iter()
            .filter_map(|q| {
                let price = q.price?;
                Some(QuoteSnapshot {
                    instrument: InstrumentKey::contract(metal, q.label.clone()),
                    observed_at: observed_at.unwrap_or(fetched_at),
                    price,
                    delta: q.delta,
                    delta_percent: q.delta_percent,
                    source,
                })
            })
            .collect(),
        FeedData::Spot(spot) => spot
            .price
            .map(|price| QuoteSnapshot {
                instrument: InstrumentKey::spot(metal),
                observed_at: spot.observed_at.unwrap_or(fetched_at),
                price,
                delta: spot.delta,
                delta_percent: spot.delta_percent,
                source,
            })
            .into_iter()
            .collect(),
        FeedData::CompanyChanges(_) => Vec::new(),
    }
}

// =============================================================================
// 내부 파싱 헬퍼
// =============================================================================

fn parse_contract_map(
    prices: &serde_json::Map<String, Value>,
    timestamp: Option<&Value>,
) -> FeedData {
    let mut quotes = Vec::new();

    for (key, entry) in prices {
        let label = match ContractLabel::new(key.as_str()) {
            Ok(label) => label,
            Err(_) => {
                tracing::debug!(key = %key, "계약월 라벨이 아닌 키 무시");
                continue;
            }
        };

        let (delta, delta_percent) = match entry.get("site_rate_change").and_then(Value::as_str) {
            Some(raw) => {
                let (d, p) = parse_rate_change(raw);
                (Some(d), Some(p))
            }
            None => (None, None),
        };

        quotes.push(ContractQuote {
            label,
            price: opt_decimal(entry.get("price")),
            delta,
            delta_percent,
        });
    }

    // 만기 오름차순으로 슬롯 바인딩 (month1 = 최근월)
    let mut labels: Vec<ContractLabel> = quotes.iter().map(|q| q.label.clone()).collect();
    labels.sort_by_key(|l| (l.year(), l.month()));
    let rolls = MonthSlot::all()
        .iter()
        .zip(labels)
        .map(|(slot, label)| (*slot, label))
        .collect();

    FeedData::ContractMonths {
        quotes,
        rolls,
        observed_at: parse_timestamp(timestamp),
    }
}

fn parse_change_list(items: &[Value]) -> Vec<ChangeQuote> {
    items
        .iter()
        .filter_map(|item| {
            let name = item.get("stockName").and_then(Value::as_str)?;
            Some(ChangeQuote {
                name: name.to_string(),
                delta: opt_decimal(item.get("priceChange")),
                observed_at: parse_timestamp(item.get("timestamp")),
            })
        })
        .collect()
}

fn parse_change_map(map: &serde_json::Map<String, Value>) -> Vec<ChangeQuote> {
    map.iter()
        .filter_map(|(name, entry)| {
            if !entry.is_object() {
                return None;
            }
            let amount = opt_decimal(entry.get("amount"));
            // sign은 amount에 적용한 뒤에만 사용한다
            let delta = match entry.get("sign").and_then(Value::as_str) {
                Some("-") => amount.map(|a| -a.abs()),
                Some(_) => amount.map(|a| a.abs()),
                None => amount,
            };
            Some(ChangeQuote {
                name: name.clone(),
                delta,
                observed_at: parse_timestamp(entry.get("last_updated")),
            })
        })
        .collect()
}

/// JSON 수치/문자열 값을 Decimal로 변환 (불가하면 None).
fn opt_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => {
            let s = n.to_string();
            s.parse::<Decimal>()
                .ok()
                .or_else(|| Decimal::from_scientific(&s).ok())
        }
        Value::String(s) => parse_signed_decimal(s.trim()),
        _ => None,
    }
}

/// 선행 '+' 부호를 허용하는 Decimal 파싱.
fn parse_signed_decimal(s: &str) -> Option<Decimal> {
    s.trim_start_matches('+').parse::<Decimal>().ok()
}

/// 업스트림 타임스탬프 파싱 (RFC 3339, "YYYY-MM-DD HH:MM:SS", epoch 초).
fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|n| Utc.from_utc_datetime(&n))
            }),
        Value::Number(n) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

// =============================================================================
// 테스트
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rate_change_negative() {
        assert_eq!(parse_rate_change("-0.4 (-0.17%)"), (dec!(-0.4), dec!(-0.17)));
    }

    #[test]
    fn test_rate_change_positive_with_plus() {
        assert_eq!(parse_rate_change("+1.2 (+0.55%)"), (dec!(1.2), dec!(0.55)));
    }

    #[test]
    fn test_rate_change_no_spaces() {
        assert_eq!(parse_rate_change("2(0.81%)"), (dec!(2), dec!(0.81)));
    }

    #[test]
    fn test_rate_change_malformed_yields_zero() {
        assert_eq!(parse_rate_change(""), (Decimal::ZERO, Decimal::ZERO));
        assert_eq!(parse_rate_change("n/a"), (Decimal::ZERO, Decimal::ZERO));
        assert_eq!(parse_rate_change("- (-%)"), (Decimal::ZERO, Decimal::ZERO));
        assert_eq!(
            parse_rate_change("garbage (x%)"),
            (Decimal::ZERO, Decimal::ZERO)
        );
    }

    proptest! {
        #[test]
        fn prop_rate_change_never_panics(s in ".{0,64}") {
            let _ = parse_rate_change(&s);
        }

        #[test]
        fn prop_valid_rate_change_roundtrip(d in -9999i64..9999, p in -999i64..999) {
            let delta = Decimal::new(d, 1);
            let pct = Decimal::new(p, 2);
            let raw = format!("{} ({}%)", delta, pct);
            prop_assert_eq!(parse_rate_change(&raw), (delta, pct));
        }
    }

    #[test]
    fn test_parse_contract_map_payload() {
        let raw = br#"{
            "prices": {
                "JAN25": {"price": 245.30, "site_rate_change": "-0.4 (-0.17%)"},
                "FEB25": {"price": 247.10, "site_rate_change": "+0.3 (+0.12%)"},
                "MAR25": {"price": 248.95}
            }
        }"#;

        let feed = parse_payload(raw).unwrap();
        let FeedData::ContractMonths { quotes, rolls, .. } = feed else {
            panic!("계약월 맵으로 파싱되어야 한다");
        };

        assert_eq!(quotes.len(), 3);
        let jan = quotes.iter().find(|q| q.label.as_str() == "JAN25").unwrap();
        assert_eq!(jan.price, Some(dec!(245.30)));
        assert_eq!(jan.delta, Some(dec!(-0.4)));
        assert_eq!(jan.delta_percent, Some(dec!(-0.17)));

        // site_rate_change 누락은 (0,0)이 아니라 "알 수 없음"
        let mar = quotes.iter().find(|q| q.label.as_str() == "MAR25").unwrap();
        assert_eq!(mar.delta, None);

        // 만기 오름차순 슬롯 바인딩
        assert_eq!(rolls[0].0, MonthSlot::Month1);
        assert_eq!(rolls[0].1.as_str(), "JAN25");
        assert_eq!(rolls[2].1.as_str(), "MAR25");
    }

    #[test]
    fn test_roll_order_across_year_boundary() {
        let raw = br#"{
            "prices": {
                "JAN26": {"price": 250.0},
                "NOV25": {"price": 245.0},
                "DEC25": {"price": 247.0}
            }
        }"#;

        let FeedData::ContractMonths { rolls, .. } = parse_payload(raw).unwrap() else {
            panic!("계약월 맵으로 파싱되어야 한다");
        };

        let labels: Vec<&str> = rolls.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(labels, vec!["NOV25", "DEC25", "JAN26"]);
    }

    #[test]
    fn test_parse_spot_payload() {
        let raw = br#"{
            "spot_price": 2431.5,
            "price_change": -12.5,
            "change_percentage": -0.51,
            "last_updated": "2025-03-04 10:00:00"
        }"#;

        let FeedData::Spot(spot) = parse_payload(raw).unwrap() else {
            panic!("현물로 파싱되어야 한다");
        };
        assert_eq!(spot.price, Some(dec!(2431.5)));
        assert_eq!(spot.delta, Some(dec!(-12.5)));
        assert!(spot.observed_at.is_some());
    }

    #[test]
    fn test_spot_null_price_preserved_as_unknown() {
        let raw = br#"{"spot_price": null, "price_change": 1.0}"#;
        let FeedData::Spot(spot) = parse_payload(raw).unwrap() else {
            panic!("현물로 파싱되어야 한다");
        };
        assert_eq!(spot.price, None);
        assert_eq!(spot.delta, Some(dec!(1.0)));
    }

    #[test]
    fn test_parse_change_list() {
        let raw = br#"[
            {"stockName": "aluminium", "priceChange": -1.25, "timestamp": 1741060800},
            {"stockName": "copper", "priceChange": "0.80"}
        ]"#;

        let FeedData::CompanyChanges(changes) = parse_payload(raw).unwrap() else {
            panic!("변동 목록으로 파싱되어야 한다");
        };
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].delta, Some(dec!(-1.25)));
        assert!(changes[0].observed_at.is_some());
        assert_eq!(changes[1].delta, Some(dec!(0.80)));
    }

    #[test]
    fn test_parse_change_map_applies_sign() {
        let raw = br#"{
            "aluminium": {"amount": 1.4, "sign": "-", "last_updated": "2025-03-04 10:00:00"},
            "zinc": {"amount": 2.1, "sign": "+"}
        }"#;

        let FeedData::CompanyChanges(mut changes) = parse_payload(raw).unwrap() else {
            panic!("변동 맵으로 파싱되어야 한다");
        };
        changes.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(changes[0].delta, Some(dec!(-1.4)));
        assert_eq!(changes[1].delta, Some(dec!(2.1)));
    }

    #[test]
    fn test_malformed_payload_is_hard_failure() {
        assert!(matches!(
            parse_payload(b"not json at all"),
            Err(DataError::ParseError(_))
        ));
        assert!(matches!(
            parse_payload(b"{}"),
            Err(DataError::ParseError(_))
        ));
        assert!(matches!(
            parse_payload(br#"{"unexpected": 1}"#),
            Err(DataError::ParseError(_))
        ));
    }

    #[test]
    fn test_normalize_drops_priceless_entries() {
        let raw = br#"{"prices": {"JAN25": {"price": null}, "FEB25": {"price": 247.1}}}"#;
        let feed = parse_payload(raw).unwrap();
        let fetched_at = Utc::now();
        let snapshots =
            normalize_quotes(Metal::Aluminium, &feed, fetched_at, QuoteSource::ScheduledPoll);

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].instrument.contract_code(), "FEB25");
        assert_eq!(snapshots[0].observed_at, fetched_at);
    }

    #[test]
    fn test_normalize_spot() {
        let raw = br#"{"spot_price": 2431.5}"#;
        let feed = parse_payload(raw).unwrap();
        let snapshots =
            normalize_quotes(Metal::Copper, &feed, Utc::now(), QuoteSource::SpotFeed);

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].instrument.contract_code(), "spot");
        assert_eq!(snapshots[0].delta, None);
    }
}
