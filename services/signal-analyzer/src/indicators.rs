//! Indicator engine
//!
//! Derives RSI, moving averages, stochastic, ATR/volatility and volume
//! statistics from a window of bars. Never fails: short windows are computed
//! over whatever is available and missing inputs fall back to neutral values
//! that are flagged on the result.

use data_retrieval::Bar;
use serde::Serialize;
use tracing::debug;

use crate::config::IndicatorConfig;

/// Volume reported when no bar carries a usable volume sample
pub const DEFAULT_VOLUME: f64 = 1000.0;

/// Neutral oscillator reading
const NEUTRAL: f64 = 50.0;

/// Threshold bound, checked in table order
#[derive(Debug, Clone, Copy)]
enum Bound {
    AtLeast(f64),
    AtMost(f64),
    Below(f64),
}

impl Bound {
    fn matches(&self, value: f64) -> bool {
        match *self {
            Bound::AtLeast(t) => value >= t,
            Bound::AtMost(t) => value <= t,
            Bound::Below(t) => value < t,
        }
    }
}

struct LabelTable {
    rows: &'static [(Bound, &'static str)],
    otherwise: &'static str,
}

impl LabelTable {
    fn classify(&self, value: f64) -> &'static str {
        self.rows
            .iter()
            .find(|(bound, _)| bound.matches(value))
            .map(|(_, label)| *label)
            .unwrap_or(self.otherwise)
    }
}

const VOLUME_RATIO_LABELS: LabelTable = LabelTable {
    rows: &[
        (Bound::AtLeast(2.0), "very high"),
        (Bound::AtLeast(1.5), "high"),
        (Bound::Below(0.3), "very low"),
        (Bound::Below(0.5), "low"),
    ],
    otherwise: "normal",
};

const RSI_LABELS: LabelTable = LabelTable {
    rows: &[
        (Bound::AtLeast(80.0), "extremely overbought"),
        (Bound::AtLeast(70.0), "overbought"),
        (Bound::AtMost(20.0), "extremely oversold"),
        (Bound::AtMost(30.0), "oversold"),
    ],
    otherwise: "neutral",
};

const STOCHASTIC_LABELS: LabelTable = LabelTable {
    rows: &[
        (Bound::AtLeast(80.0), "overbought"),
        (Bound::AtMost(20.0), "oversold"),
    ],
    otherwise: "neutral",
};

/// ATR as a percentage of price
const VOLATILITY_LABELS: LabelTable = LabelTable {
    rows: &[
        (Bound::AtLeast(3.0), "extreme"),
        (Bound::AtLeast(1.5), "high"),
        (Bound::AtLeast(0.5), "moderate"),
    ],
    otherwise: "low",
};

pub fn volume_ratio_label(ratio: f64) -> &'static str {
    VOLUME_RATIO_LABELS.classify(ratio)
}

pub fn rsi_label(rsi: f64) -> &'static str {
    RSI_LABELS.classify(rsi)
}

pub fn stochastic_label(k: f64) -> &'static str {
    STOCHASTIC_LABELS.classify(k)
}

pub fn volatility_label(pct: f64) -> &'static str {
    VOLATILITY_LABELS.classify(pct)
}

/// A value with its human-readable interpretation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorReading {
    pub value: f64,
    pub label: &'static str,
}

impl IndicatorReading {
    fn new(value: f64, label: &'static str) -> Self {
        Self { value, label }
    }
}

/// Fully populated indicator output for one analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSet {
    pub rsi: IndicatorReading,
    pub sma_fast: IndicatorReading,
    pub sma_slow: IndicatorReading,
    pub ema: IndicatorReading,
    /// Fast vs slow SMA spread in percent
    pub trend: IndicatorReading,
    pub stochastic_k: IndicatorReading,
    pub stochastic_d: IndicatorReading,
    pub atr: IndicatorReading,
    pub volatility: IndicatorReading,
    pub volume_current: IndicatorReading,
    pub volume_average: IndicatorReading,
    pub volume_ratio: IndicatorReading,
    /// Bars with a usable close price
    pub bars_used: usize,
    pub no_valid_prices: bool,
    pub no_valid_volume: bool,
}

impl IndicatorSet {
    /// Name → reading pairs in a fixed order
    pub fn entries(&self) -> [(&'static str, IndicatorReading); 12] {
        [
            ("rsi", self.rsi),
            ("sma_fast", self.sma_fast),
            ("sma_slow", self.sma_slow),
            ("ema", self.ema),
            ("trend", self.trend),
            ("stochastic_k", self.stochastic_k),
            ("stochastic_d", self.stochastic_d),
            ("atr", self.atr),
            ("volatility", self.volatility),
            ("volume_current", self.volume_current),
            ("volume_average", self.volume_average),
            ("volume_ratio", self.volume_ratio),
        ]
    }
}

/// Current/average volume over the configured window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeStats {
    pub current: f64,
    pub average: f64,
    pub ratio: f64,
    /// False when the sentinel was used
    pub observed: bool,
}

/// Volume statistics over the last `window` bars
///
/// Zero, negative, non-finite and missing samples are skipped. The current
/// volume is the newest valid sample and the average is taken over the valid
/// samples before it.
pub fn volume_stats(bars: &[Bar], window: usize) -> VolumeStats {
    let start = bars.len().saturating_sub(window.max(1));
    let valid: Vec<f64> = bars[start..]
        .iter()
        .filter_map(|b| b.volume)
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();

    let Some((&current, previous)) = valid.split_last() else {
        return VolumeStats {
            current: DEFAULT_VOLUME,
            average: DEFAULT_VOLUME,
            ratio: 1.0,
            observed: false,
        };
    };

    let average = if previous.is_empty() {
        current
    } else {
        previous.iter().sum::<f64>() / previous.len() as f64
    };

    let ratio = if average > 0.0 { current / average } else { 1.0 };

    VolumeStats {
        current,
        average,
        ratio,
        observed: true,
    }
}

/// Price sample with sanitized high/low
#[derive(Debug, Clone, Copy)]
struct PricePoint {
    high: f64,
    low: f64,
    close: f64,
}

fn valid_prices(bars: &[Bar]) -> Vec<PricePoint> {
    bars.iter()
        .filter(|b| b.close.is_finite() && b.close > 0.0)
        .map(|b| {
            let high = if b.high.is_finite() && b.high > 0.0 { b.high.max(b.close) } else { b.close };
            let low = if b.low.is_finite() && b.low > 0.0 { b.low.min(b.close) } else { b.close };
            PricePoint { high, low, close: b.close }
        })
        .collect()
}

/// Indicator engine
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Compute the full indicator set for oldest-to-newest `bars`
    pub fn compute(&self, bars: &[Bar]) -> IndicatorSet {
        let cfg = &self.config;
        let points = valid_prices(bars);
        let volume = volume_stats(bars, cfg.volume_window);

        debug!(
            bars = bars.len(),
            valid = points.len(),
            volume_observed = volume.observed,
            "Computing indicators"
        );

        let volume_label = if volume.observed { "observed" } else { "default" };
        let volume_current = IndicatorReading::new(volume.current, volume_label);
        let volume_average = IndicatorReading::new(volume.average, volume_label);
        let volume_ratio = IndicatorReading::new(volume.ratio, volume_ratio_label(volume.ratio));

        let Some(last) = points.last() else {
            return IndicatorSet {
                rsi: IndicatorReading::new(NEUTRAL, rsi_label(NEUTRAL)),
                sma_fast: IndicatorReading::new(0.0, "unavailable"),
                sma_slow: IndicatorReading::new(0.0, "unavailable"),
                ema: IndicatorReading::new(0.0, "unavailable"),
                trend: IndicatorReading::new(0.0, "flat"),
                stochastic_k: IndicatorReading::new(NEUTRAL, stochastic_label(NEUTRAL)),
                stochastic_d: IndicatorReading::new(NEUTRAL, stochastic_label(NEUTRAL)),
                atr: IndicatorReading::new(0.0, volatility_label(0.0)),
                volatility: IndicatorReading::new(0.0, volatility_label(0.0)),
                volume_current,
                volume_average,
                volume_ratio,
                bars_used: 0,
                no_valid_prices: true,
                no_valid_volume: !volume.observed,
            };
        };

        let closes: Vec<f64> = points.iter().map(|p| p.close).collect();
        let price = last.close;

        let rsi = calculate_rsi(&closes, cfg.rsi_period);
        let sma_fast = calculate_sma(&closes, cfg.sma_fast);
        let sma_slow = calculate_sma(&closes, cfg.sma_slow);
        let ema = calculate_ema(&closes, cfg.ema_period);
        let (stoch_k, stoch_d) =
            calculate_stochastic(&points, cfg.stochastic_period, cfg.stochastic_smoothing);
        let atr = calculate_atr(&points, cfg.atr_period);
        let volatility = atr / price * 100.0;

        let trend_pct = if sma_slow > 0.0 {
            (sma_fast - sma_slow) / sma_slow * 100.0
        } else {
            0.0
        };
        let trend_label = if sma_fast > sma_slow {
            "bullish"
        } else if sma_fast < sma_slow {
            "bearish"
        } else {
            "flat"
        };

        IndicatorSet {
            rsi: IndicatorReading::new(rsi, rsi_label(rsi)),
            sma_fast: IndicatorReading::new(sma_fast, relative_to(price, sma_fast)),
            sma_slow: IndicatorReading::new(sma_slow, relative_to(price, sma_slow)),
            ema: IndicatorReading::new(ema, relative_to(price, ema)),
            trend: IndicatorReading::new(trend_pct, trend_label),
            stochastic_k: IndicatorReading::new(stoch_k, stochastic_label(stoch_k)),
            stochastic_d: IndicatorReading::new(stoch_d, stochastic_label(stoch_d)),
            atr: IndicatorReading::new(atr, volatility_label(volatility)),
            volatility: IndicatorReading::new(volatility, volatility_label(volatility)),
            volume_current,
            volume_average,
            volume_ratio,
            bars_used: points.len(),
            no_valid_prices: false,
            no_valid_volume: !volume.observed,
        }
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new(IndicatorConfig::default())
    }
}

/// Where the current price sits against an average
fn relative_to(price: f64, average: f64) -> &'static str {
    if price > average {
        "price above"
    } else if price < average {
        "price below"
    } else {
        "at price"
    }
}

fn calculate_sma(closes: &[f64], period: usize) -> f64 {
    let take = period.min(closes.len());
    if take == 0 {
        return 0.0;
    }
    closes.iter().rev().take(take).sum::<f64>() / take as f64
}

/// EMA seeded with the first close
fn calculate_ema(closes: &[f64], period: usize) -> f64 {
    let Some((&first, rest)) = closes.split_first() else {
        return 0.0;
    };
    let alpha = 2.0 / (period as f64 + 1.0);
    rest.iter()
        .fold(first, |ema, close| alpha * close + (1.0 - alpha) * ema)
}

fn calculate_rsi(closes: &[f64], period: usize) -> f64 {
    if closes.len() < 2 {
        return NEUTRAL;
    }

    let start = closes.len().saturating_sub(period + 1);
    let mut gains = 0.0;
    let mut losses = 0.0;

    for pair in closes[start..].windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses += change.abs();
        }
    }

    if gains == 0.0 && losses == 0.0 {
        return NEUTRAL;
    }
    if losses == 0.0 {
        return 100.0;
    }

    let rs = gains / losses;
    100.0 - (100.0 / (1.0 + rs))
}

/// %K for the window ending at `end` (inclusive)
fn stochastic_k_at(points: &[PricePoint], end: usize, period: usize) -> f64 {
    let start = (end + 1).saturating_sub(period);
    let window = &points[start..=end];
    let highest = window.iter().map(|p| p.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|p| p.low).fold(f64::MAX, f64::min);
    let range = highest - lowest;
    if range <= 0.0 {
        return NEUTRAL;
    }
    (points[end].close - lowest) / range * 100.0
}

/// Returns (%K, %D)
fn calculate_stochastic(points: &[PricePoint], period: usize, smoothing: usize) -> (f64, f64) {
    if points.is_empty() {
        return (NEUTRAL, NEUTRAL);
    }

    let last = points.len() - 1;
    let k = stochastic_k_at(points, last, period);

    let from = (last + 1).saturating_sub(smoothing.max(1));
    let ks: Vec<f64> = (from..=last)
        .map(|end| stochastic_k_at(points, end, period))
        .collect();
    let d = ks.iter().sum::<f64>() / ks.len() as f64;

    (k, d)
}

fn calculate_atr(points: &[PricePoint], period: usize) -> f64 {
    if points.is_empty() {
        return 0.0;
    }

    let true_ranges: Vec<f64> = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let range = p.high - p.low;
            match i.checked_sub(1).map(|j| points[j].close) {
                Some(prev) => range.max((p.high - prev).abs()).max((p.low - prev).abs()),
                None => range,
            }
        })
        .collect();

    let take = period.min(true_ranges.len());
    true_ranges.iter().rev().take(take).sum::<f64>() / take as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars_from(closes: &[f64]) -> Vec<Bar> {
        closes.iter().map(|c| Bar::at_price(*c, Some(1000.0))).collect()
    }

    fn with_volumes(volumes: &[Option<f64>]) -> Vec<Bar> {
        volumes.iter().map(|v| Bar::at_price(100.0, *v)).collect()
    }

    #[test]
    fn test_volume_ratio_boundary_is_high() {
        let bars = with_volumes(&[Some(1000.0), Some(1000.0), Some(1500.0)]);
        let stats = volume_stats(&bars, 20);
        assert_eq!(stats.current, 1500.0);
        assert_eq!(stats.average, 1000.0);
        assert_eq!(stats.ratio, 1.5);
        assert_eq!(volume_ratio_label(stats.ratio), "high");
    }

    #[test]
    fn test_no_valid_volume_uses_sentinel() {
        let bars = with_volumes(&[None, Some(0.0), Some(-5.0), Some(f64::NAN)]);
        let stats = volume_stats(&bars, 20);
        assert!(!stats.observed);
        assert_eq!(stats.current, DEFAULT_VOLUME);
        assert_eq!(stats.ratio, 1.0);
        assert_eq!(volume_ratio_label(stats.ratio), "normal");
    }

    #[test]
    fn test_invalid_volume_samples_are_skipped() {
        let bars = with_volumes(&[Some(800.0), Some(1200.0), Some(0.0), Some(500.0), None]);
        let stats = volume_stats(&bars, 20);
        assert_eq!(stats.current, 500.0);
        assert_eq!(stats.average, 1000.0);
        assert_eq!(volume_ratio_label(stats.ratio), "normal");
    }

    #[test]
    fn test_single_volume_sample_is_its_own_average() {
        let stats = volume_stats(&with_volumes(&[Some(700.0)]), 20);
        assert_eq!(stats.average, 700.0);
        assert_eq!(stats.ratio, 1.0);
    }

    #[test]
    fn test_volume_window_limits_history() {
        let mut volumes = vec![Some(10_000.0); 30];
        volumes.extend([Some(100.0), Some(100.0), Some(100.0)]);
        let stats = volume_stats(&with_volumes(&volumes), 3);
        assert_eq!(stats.average, 100.0);
    }

    #[test]
    fn test_label_tables() {
        assert_eq!(volume_ratio_label(2.0), "very high");
        assert_eq!(volume_ratio_label(0.29), "very low");
        assert_eq!(volume_ratio_label(0.3), "low");
        assert_eq!(volume_ratio_label(0.5), "normal");
        assert_eq!(rsi_label(85.0), "extremely overbought");
        assert_eq!(rsi_label(70.0), "overbought");
        assert_eq!(rsi_label(30.0), "oversold");
        assert_eq!(rsi_label(15.0), "extremely oversold");
        assert_eq!(rsi_label(50.0), "neutral");
        assert_eq!(stochastic_label(80.0), "overbought");
        assert_eq!(volatility_label(0.2), "low");
        assert_eq!(volatility_label(1.5), "high");
    }

    #[test]
    fn test_rising_series_is_bullish_and_overbought() {
        let closes: Vec<f64> = (1..=60).map(|i| 100.0 + i as f64).collect();
        let set = IndicatorEngine::default().compute(&bars_from(&closes));

        assert_eq!(set.rsi.value, 100.0);
        assert_eq!(set.rsi.label, "extremely overbought");
        assert_eq!(set.trend.label, "bullish");
        assert!(set.sma_fast.value > set.sma_slow.value);
        assert_eq!(set.sma_fast.label, "price above");
        assert_eq!(set.bars_used, 60);
        assert!(!set.no_valid_prices);
    }

    #[test]
    fn test_short_window_still_computes() {
        let set = IndicatorEngine::default().compute(&bars_from(&[100.0, 99.0, 98.0]));
        assert_eq!(set.rsi.value, 0.0);
        assert_eq!(set.sma_slow.value, 99.0);
        assert_eq!(set.trend.label, "flat");
        assert_eq!(set.bars_used, 3);
    }

    #[test]
    fn test_no_valid_prices_gives_neutral_defaults() {
        let bars = vec![Bar::at_price(f64::NAN, None), Bar::at_price(-1.0, None)];
        let set = IndicatorEngine::default().compute(&bars);

        assert!(set.no_valid_prices);
        assert!(set.no_valid_volume);
        assert_eq!(set.rsi.value, 50.0);
        assert_eq!(set.stochastic_k.value, 50.0);
        assert_eq!(set.sma_fast.value, 0.0);
        assert_eq!(set.atr.value, 0.0);
        assert_eq!(set.entries().len(), 12);
    }

    #[test]
    fn test_atr_and_stochastic() {
        let bars: Vec<Bar> = (0..20)
            .map(|i| Bar {
                timestamp: None,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: if i == 19 { 101.0 } else { 100.0 },
                volume: None,
            })
            .collect();
        let set = IndicatorEngine::default().compute(&bars);

        assert!((set.atr.value - 2.0).abs() < 1e-9);
        assert_eq!(set.stochastic_k.value, 100.0);
        assert!(set.stochastic_d.value > 50.0);
        assert_eq!(set.volatility.label, "high");
    }

    #[test]
    fn test_entries_order_is_fixed() {
        let set = IndicatorEngine::default().compute(&bars_from(&[1.0, 2.0]));
        let names: Vec<&str> = set.entries().iter().map(|(n, _)| *n).collect();
        assert_eq!(names.first(), Some(&"rsi"));
        assert_eq!(names.last(), Some(&"volume_ratio"));
    }
}
