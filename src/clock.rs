use std::time::{SystemTime, UNIX_EPOCH};

/// 時刻ソース
///
/// タイムステップ計算・有効期限判定をテスト可能にするため、
/// 現在時刻は常にこのトレイト経由で取得する。
pub trait Clock: Send + Sync {
    /// 現在のUNIX秒を返す
    fn now(&self) -> i64;
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now(&self) -> i64 {
        (**self).now()
    }
}

/// システム時刻を返す実装
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// 固定時刻を返すテスト用実装
#[derive(Debug, Clone)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a > 1_500_000_000);
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock(12_345);
        assert_eq!(clock.now(), 12_345);
    }
}
