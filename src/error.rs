///! The engine's error taxonomy. Every public [`crate::engine::PairEngine`]
///! method returns one of these tags (see spec §6/§7); the tag is the part
///! callers should match on, the message is for logs and diagnostics only.
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("AI: pool already initialized")]
    AlreadyInitialized,
    #[error("LOK: pool is locked (re-entrant call)")]
    Locked,
    #[error("R: price is outside the representable tick range")]
    PriceOutOfRange,
    #[error("MIN: price is at or below the minimum tick's price")]
    BelowMinTick,
    #[error("MAX: price is at or above the maximum tick's price")]
    AboveMaxTick,
    #[error("TLU: lower tick must be less than upper tick")]
    TicksMisordered,
    #[error("TLM: lower tick is below the minimum allowed tick")]
    TickLowerTooLow,
    #[error("TUM: upper tick is above the maximum allowed tick")]
    TickUpperTooHigh,
    #[error("TS: tick is not a multiple of the pool's tick spacing")]
    TickMisaligned,
    #[error("LO: liquidity gross at a tick would exceed the per-tick cap")]
    LiquidityOverflow,
    #[error("NP: no position exists for this owner and range")]
    NoPosition,
    #[error("CP: cannot burn more liquidity than the position holds")]
    CannotBurnMoreThanPosition,
    #[error("OO: no initialized tick found in the direction of travel")]
    OrderOutOfBounds,
    #[error("TOK: cannot recover the pair's own token0/token1")]
    CannotRecoverPoolToken,
    #[error("LS: liquidity subtraction underflowed")]
    LiquiditySub,
    #[error("LA: liquidity addition overflowed")]
    LiquidityAdd,
    #[error("M0: swap callback underpaid token0")]
    CallbackUnderpaidToken0,
    #[error("M1: swap callback underpaid token1")]
    CallbackUnderpaidToken1,
    #[error("arithmetic overflowed a fixed-width integer")]
    Overflow,
}

impl EngineError {
    /// The short tag a conforming implementation must preserve, e.g. `"LOK"`.
    pub fn tag(self) -> &'static str {
        use EngineError::*;
        match self {
            AlreadyInitialized => "AI",
            Locked => "LOK",
            PriceOutOfRange => "R",
            BelowMinTick => "MIN",
            AboveMaxTick => "MAX",
            TicksMisordered => "TLU",
            TickLowerTooLow => "TLM",
            TickUpperTooHigh => "TUM",
            TickMisaligned => "TS",
            LiquidityOverflow => "LO",
            NoPosition => "NP",
            CannotBurnMoreThanPosition => "CP",
            OrderOutOfBounds => "OO",
            CannotRecoverPoolToken => "TOK",
            LiquiditySub => "LS",
            LiquidityAdd => "LA",
            CallbackUnderpaidToken0 => "M0",
            CallbackUnderpaidToken1 => "M1",
            Overflow => "OVERFLOW",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_spec_error_codes() {
        assert_eq!(EngineError::Locked.tag(), "LOK");
        assert_eq!(EngineError::NoPosition.tag(), "NP");
        assert_eq!(EngineError::CallbackUnderpaidToken1.tag(), "M1");
    }
}
