//! 합성 OCO(One-Cancels-Other) 주문 쌍.
//!
//! 거래소 네이티브 OCO가 아니라 독립된 두 스톱 주문을 폴링으로 묶습니다.
//! 상태: `Pending → BothLegsOpen → Resolved`.
//!
//! 해소 규칙: 한쪽 주문 ID만 미체결 목록에 남아 있으면 **남아 있는 쪽**을
//! 취소합니다. 사라진 이유(체결, 수동 취소)는 구분하지 않습니다.
//! 둘 다 사라졌으면 추가 작업 없이 해소합니다.

use std::collections::{BTreeMap, HashSet};

/// OCO 쌍 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcoState {
    /// 두 주문이 모두 접수되기 전
    Pending,
    /// 두 주문 모두 접수됨
    BothLegsOpen,
    /// 해소됨
    Resolved,
}

/// 심볼 하나의 OCO 쌍.
#[derive(Debug, Clone, PartialEq)]
pub struct OcoPair {
    pub symbol: String,
    pub buy_order_id: String,
    pub sell_order_id: String,
    pub state: OcoState,
}

/// 폴링 결과로 결정된 작업.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcoResolution {
    /// 두 주문 모두 남아 있음
    Pending,
    /// 이 주문을 취소하고 쌍을 해소
    CancelRemaining(String),
    /// 두 주문 모두 사라짐, 쌍만 해소
    BothGone,
}

impl OcoPair {
    /// 두 주문이 접수된 새 쌍.
    pub fn new(symbol: impl Into<String>, buy_order_id: impl Into<String>, sell_order_id: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            buy_order_id: buy_order_id.into(),
            sell_order_id: sell_order_id.into(),
            state: OcoState::BothLegsOpen,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == OcoState::BothLegsOpen
    }

    /// 현재 미체결 주문 ID로 다음 작업을 결정합니다.
    pub fn resolve(&self, open_order_ids: &HashSet<String>) -> OcoResolution {
        let buy_open = open_order_ids.contains(&self.buy_order_id);
        let sell_open = open_order_ids.contains(&self.sell_order_id);

        match (buy_open, sell_open) {
            (true, true) => OcoResolution::Pending,
            (true, false) => OcoResolution::CancelRemaining(self.buy_order_id.clone()),
            (false, true) => OcoResolution::CancelRemaining(self.sell_order_id.clone()),
            (false, false) => OcoResolution::BothGone,
        }
    }
}

/// 심볼별 OCO 쌍 장부. 심볼당 최대 하나의 쌍만 존재합니다.
#[derive(Debug, Clone, Default)]
pub struct OcoBook {
    pairs: BTreeMap<String, OcoPair>,
}

impl OcoBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// 쌍을 등록합니다. 같은 심볼에 활성 쌍이 있으면 `false`.
    pub fn insert(&mut self, pair: OcoPair) -> bool {
        if self.pairs.get(&pair.symbol).is_some_and(OcoPair::is_active) {
            return false;
        }
        self.pairs.insert(pair.symbol.clone(), pair);
        true
    }

    pub fn get(&self, symbol: &str) -> Option<&OcoPair> {
        self.pairs.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.pairs.contains_key(symbol)
    }

    /// 쌍을 해소 상태로 표시하고 장부에서 제거합니다.
    pub fn resolve(&mut self, symbol: &str) -> Option<OcoPair> {
        self.pairs.remove(symbol).map(|mut pair| {
            pair.state = OcoState::Resolved;
            pair
        })
    }

    /// 장부의 심볼 목록 (정렬됨).
    pub fn symbols(&self) -> Vec<String> {
        self.pairs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// 모든 쌍을 제거합니다.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolution_cancels_remaining_leg() {
        let pair = OcoPair::new("LDOUSDT", "1", "2");

        assert_eq!(pair.resolve(&ids(&["1", "2", "9"])), OcoResolution::Pending);
        assert_eq!(pair.resolve(&ids(&["1"])), OcoResolution::CancelRemaining("1".into()));
        assert_eq!(pair.resolve(&ids(&["2"])), OcoResolution::CancelRemaining("2".into()));
        assert_eq!(pair.resolve(&ids(&[])), OcoResolution::BothGone);
    }

    #[test]
    fn test_book_one_pair_per_symbol() {
        let mut book = OcoBook::new();
        assert!(book.insert(OcoPair::new("LDOUSDT", "1", "2")));
        assert!(!book.insert(OcoPair::new("LDOUSDT", "3", "4")));
        assert_eq!(book.get("LDOUSDT").unwrap().buy_order_id, "1");

        let resolved = book.resolve("LDOUSDT").unwrap();
        assert_eq!(resolved.state, OcoState::Resolved);
        assert!(book.is_empty());
        assert!(book.resolve("LDOUSDT").is_none());
    }
}
