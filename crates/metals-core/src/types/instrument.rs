//! 금속/계약월 식별자 타입.
//!
//! 이 모듈은 추적 대상 금속과 계약월 라벨을 정의합니다:
//! - `Metal` - 추적 금속 (LME 비철금속 6종)
//! - `ContractLabel` - 롤링 계약월 라벨 (예: "JAN25")
//! - `MonthSlot` - 라벨이 바인딩되는 가격 슬롯 (month1/month2/month3)
//! - `InstrumentKey` - 금속 + 계약월 조합 키
//!
//! 계약월 라벨은 시간이 지나면서 의미(실제 월)가 바뀌는 롤링 라벨입니다.
//! 소비자는 항상 최신 롤 상태에서 라벨을 해석해야 하며, 캐시된 라벨로
//! 조회하면 다른 계약을 조회하게 됩니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// 추적 대상 금속.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metal {
    Aluminium,
    Copper,
    Zinc,
    Lead,
    Nickel,
    Tin,
}

impl Metal {
    /// 저장소/API에서 사용하는 소문자 코드를 반환합니다.
    pub fn code(&self) -> &'static str {
        match self {
            Metal::Aluminium => "aluminium",
            Metal::Copper => "copper",
            Metal::Zinc => "zinc",
            Metal::Lead => "lead",
            Metal::Nickel => "nickel",
            Metal::Tin => "tin",
        }
    }

    /// 전체 금속 목록.
    pub fn all() -> &'static [Metal] {
        &[
            Metal::Aluminium,
            Metal::Copper,
            Metal::Zinc,
            Metal::Lead,
            Metal::Nickel,
            Metal::Tin,
        ]
    }
}

impl fmt::Display for Metal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Metal {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aluminium" | "aluminum" => Ok(Metal::Aluminium),
            "copper" => Ok(Metal::Copper),
            "zinc" => Ok(Metal::Zinc),
            "lead" => Ok(Metal::Lead),
            "nickel" => Ok(Metal::Nickel),
            "tin" => Ok(Metal::Tin),
            _ => Err(EngineError::InvalidInput(format!("알 수 없는 금속: {}", s))),
        }
    }
}

/// 계약월 가격 슬롯.
///
/// 업스트림 피드는 현재/차월/3개월 세 개의 가격 슬롯을 제공하며,
/// 각 슬롯에 바인딩된 라벨은 계약 만기마다 앞으로 롤링됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonthSlot {
    Month1,
    Month2,
    Month3,
}

impl MonthSlot {
    /// 저장소에서 사용하는 슬롯 코드를 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            MonthSlot::Month1 => "month1",
            MonthSlot::Month2 => "month2",
            MonthSlot::Month3 => "month3",
        }
    }

    /// 전체 슬롯 목록 (만기 순서).
    pub fn all() -> &'static [MonthSlot] {
        &[MonthSlot::Month1, MonthSlot::Month2, MonthSlot::Month3]
    }
}

impl fmt::Display for MonthSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MonthSlot {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "month1" => Ok(MonthSlot::Month1),
            "month2" => Ok(MonthSlot::Month2),
            "month3" => Ok(MonthSlot::Month3),
            _ => Err(EngineError::InvalidInput(format!("알 수 없는 슬롯: {}", s))),
        }
    }
}

/// 롤링 계약월 라벨 (예: "JAN25", "MAR25").
///
/// 세 글자 월 약어 + 두 자리 연도 형식만 허용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractLabel(String);

const MONTH_CODES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

impl ContractLabel {
    /// 라벨 문자열을 검증하여 생성합니다.
    pub fn new(label: impl Into<String>) -> Result<Self, EngineError> {
        let label = label.into().to_uppercase();
        let valid = label.is_ascii()
            && label.len() == 5
            && MONTH_CODES.contains(&&label[..3])
            && label[3..].chars().all(|c| c.is_ascii_digit());
        if valid {
            Ok(Self(label))
        } else {
            Err(EngineError::InvalidInput(format!(
                "잘못된 계약월 라벨: {}",
                label
            )))
        }
    }

    /// 라벨 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 라벨이 가리키는 월 (1-12).
    pub fn month(&self) -> u32 {
        MONTH_CODES
            .iter()
            .position(|m| *m == &self.0[..3])
            .map(|i| i as u32 + 1)
            .unwrap_or(0)
    }

    /// 라벨이 가리키는 연도 (예: 2025).
    pub fn year(&self) -> i32 {
        self.0[3..].parse::<i32>().map(|y| 2000 + y).unwrap_or(0)
    }
}

impl fmt::Display for ContractLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContractLabel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// 금속 + 계약월 조합 키.
///
/// `contract`가 `None`이면 현물(spot) 시리즈를 가리킵니다.
/// 문자열 표현은 `"aluminium:JAN25"` 또는 `"aluminium:spot"`입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentKey {
    /// 금속
    pub metal: Metal,
    /// 계약월 라벨 (현물이면 None)
    pub contract: Option<ContractLabel>,
}

impl InstrumentKey {
    /// 현물 시리즈 키를 생성합니다.
    pub fn spot(metal: Metal) -> Self {
        Self {
            metal,
            contract: None,
        }
    }

    /// 계약월 시리즈 키를 생성합니다.
    pub fn contract(metal: Metal, label: ContractLabel) -> Self {
        Self {
            metal,
            contract: Some(label),
        }
    }

    /// 저장소에서 사용하는 계약월 컬럼 값을 반환합니다.
    pub fn contract_code(&self) -> &str {
        self.contract.as_ref().map(|c| c.as_str()).unwrap_or("spot")
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.metal, self.contract_code())
    }
}

impl FromStr for InstrumentKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (metal_str, contract_str) = s
            .split_once(':')
            .ok_or_else(|| EngineError::InvalidInput(format!("잘못된 인스트루먼트 키: {}", s)))?;
        let metal = metal_str.parse()?;
        let contract = match contract_str.to_lowercase().as_str() {
            "spot" | "" => None,
            _ => Some(contract_str.parse()?),
        };
        Ok(Self { metal, contract })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metal_roundtrip() {
        for metal in Metal::all() {
            let parsed: Metal = metal.code().parse().unwrap();
            assert_eq!(parsed, *metal);
        }
    }

    #[test]
    fn test_metal_us_spelling() {
        let parsed: Metal = "aluminum".parse().unwrap();
        assert_eq!(parsed, Metal::Aluminium);
    }

    #[test]
    fn test_contract_label_valid() {
        let label = ContractLabel::new("jan25").unwrap();
        assert_eq!(label.as_str(), "JAN25");
        assert_eq!(label.month(), 1);
        assert_eq!(label.year(), 2025);
    }

    #[test]
    fn test_contract_label_invalid() {
        assert!(ContractLabel::new("JANUARY25").is_err());
        assert!(ContractLabel::new("XXX25").is_err());
        assert!(ContractLabel::new("JAN2025").is_err());
    }

    #[test]
    fn test_instrument_key_roundtrip() {
        let key: InstrumentKey = "aluminium:JAN25".parse().unwrap();
        assert_eq!(key.metal, Metal::Aluminium);
        assert_eq!(key.contract_code(), "JAN25");
        assert_eq!(key.to_string(), "aluminium:JAN25");

        let spot: InstrumentKey = "copper:spot".parse().unwrap();
        assert!(spot.contract.is_none());
        assert_eq!(spot.to_string(), "copper:spot");
    }
}
