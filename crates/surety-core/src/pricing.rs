/// Pure pricing function over the pooled exposure.
///
/// ```text
/// risk_loading = floor(secured * total_secured / (treasury + secured))
/// premium      = secured + risk_loading
/// ```
///
/// The loading grows with aggregate exposure and shrinks as the treasury is
/// better funded; a fresh pool with zero exposure prices at bare coverage.
/// Integer arithmetic keeps results stable across platforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct PremiumModel;

impl PremiumModel {
    pub fn new() -> Self {
        Self
    }

    /// Quote the premium for `secured_amount` of coverage.
    ///
    /// The divisor is positive whenever `secured_amount > 0`; a zero request
    /// prices at zero. The product is widened to u128 so u64 amounts cannot
    /// overflow.
    pub fn premium(
        &self,
        secured_amount: u64,
        total_secured_amount: u64,
        treasury_balance: u64,
    ) -> u64 {
        if secured_amount == 0 {
            return 0;
        }

        let numerator = secured_amount as u128 * total_secured_amount as u128;
        let divisor = treasury_balance as u128 + secured_amount as u128;
        // risk_loading <= total_secured_amount, so the cast back is lossless.
        let risk_loading = (numerator / divisor) as u64;

        secured_amount.saturating_add(risk_loading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_pool_prices_at_bare_coverage() {
        let model = PremiumModel::new();
        assert_eq!(model.premium(100, 0, 1_000), 100);
    }

    #[test]
    fn loaded_pool_adds_floor_division_loading() {
        let model = PremiumModel::new();
        // 100 + floor(100 * 500 / (500 + 100)) = 100 + 83
        assert_eq!(model.premium(100, 500, 500), 183);
    }

    #[test]
    fn monotonic_in_exposure() {
        let model = PremiumModel::new();
        let mut last = 0;
        for exposure in [0, 100, 1_000, 10_000, 100_000] {
            let quote = model.premium(500, exposure, 2_000);
            assert!(quote >= last);
            last = quote;
        }
    }

    #[test]
    fn anti_monotonic_in_treasury() {
        let model = PremiumModel::new();
        let mut last = u64::MAX;
        for treasury in [0, 100, 1_000, 10_000, 100_000] {
            let quote = model.premium(500, 5_000, treasury);
            assert!(quote <= last);
            last = quote;
        }
    }

    #[test]
    fn zero_request_prices_at_zero() {
        let model = PremiumModel::new();
        assert_eq!(model.premium(0, 5_000, 0), 0);
    }

    #[test]
    fn large_amounts_do_not_overflow() {
        let model = PremiumModel::new();
        let quote = model.premium(u64::MAX / 2, u64::MAX / 2, 0);
        assert!(quote >= u64::MAX / 2);
    }
}
