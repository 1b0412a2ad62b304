use std::fmt::{Display, Formatter};

use serde::Serialize;

/// Fewer closes than this yields no indicators at all.
pub const MIN_CLOSES: usize = 20;

const RSI_PERIOD: usize = 14;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_WIDTH: f64 = 2.0;
const SQUEEZE_BANDWIDTH: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Signal {
    /// Map a 0-10 score onto a signal.
    pub fn from_score(score: f64) -> Self {
        if score >= 8.0 {
            Self::StrongBuy
        } else if score >= 6.0 {
            Self::Buy
        } else if score >= 4.0 {
            Self::Hold
        } else if score >= 2.0 {
            Self::Sell
        } else {
            Self::StrongSell
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StrongBuy => "strong_buy",
            Self::Buy => "buy",
            Self::Hold => "hold",
            Self::Sell => "sell",
            Self::StrongSell => "strong_sell",
        }
    }

    const fn is_bullish(self) -> bool {
        matches!(self, Self::StrongBuy | Self::Buy)
    }

    const fn is_bearish(self) -> bool {
        matches!(self, Self::StrongSell | Self::Sell)
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Macd {
    pub macd: f64,
    pub signal_line: f64,
    pub histogram: f64,
    pub signal: Signal,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rsi {
    pub value: f64,
    pub signal: Signal,
    pub score: f64,
    pub overbought: bool,
    pub oversold: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovingAverages {
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub signal: Signal,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// Band width as a percentage of the middle band.
    pub bandwidth: f64,
    /// Position of the last close within the bands, 0 at the lower band.
    pub percent_b: f64,
    pub squeeze: bool,
    pub signal: Signal,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicalIndicators {
    pub closes: usize,
    pub macd: Option<Macd>,
    pub rsi: Option<Rsi>,
    pub moving_averages: MovingAverages,
    pub bollinger: Option<BollingerBands>,
    /// Weighted 0-10 score over the indicators that could be computed.
    pub score: f64,
    pub signal: Signal,
    /// Share of the four indicators that contributed, in percent.
    pub confidence: f64,
    pub bullish: usize,
    pub bearish: usize,
    pub neutral: usize,
}

/// Compute MACD(12, 26, 9), RSI(14), SMA/EMA trend and Bollinger(20, 2)
/// over closes ordered oldest first.
pub fn technical_indicators(closes: &[f64]) -> Option<TechnicalIndicators> {
    if closes.len() < MIN_CLOSES || closes.iter().any(|close| !close.is_finite()) {
        return None;
    }

    let macd = macd(closes);
    let rsi = rsi(closes, RSI_PERIOD);
    let moving_averages = moving_averages(closes);
    let bollinger = bollinger(closes, BOLLINGER_PERIOD, BOLLINGER_WIDTH);

    let weighted: Vec<(f64, f64, Signal)> = [
        macd.as_ref().map(|m| (m.score, 0.30, m.signal)),
        rsi.as_ref().map(|r| (r.score, 0.20, r.signal)),
        Some((moving_averages.score, 0.35, moving_averages.signal)),
        bollinger.as_ref().map(|b| (b.score, 0.15, b.signal)),
    ]
    .into_iter()
    .flatten()
    .collect();

    let total_weight: f64 = weighted.iter().map(|(_, weight, _)| weight).sum();
    let score = weighted
        .iter()
        .map(|(score, weight, _)| score * weight)
        .sum::<f64>()
        / total_weight;
    let bullish = weighted.iter().filter(|(_, _, s)| s.is_bullish()).count();
    let bearish = weighted.iter().filter(|(_, _, s)| s.is_bearish()).count();

    Some(TechnicalIndicators {
        closes: closes.len(),
        confidence: weighted.len() as f64 / 4.0 * 100.0,
        neutral: weighted.len() - bullish - bearish,
        bullish,
        bearish,
        signal: Signal::from_score(score),
        score,
        macd,
        rsi,
        moving_averages,
        bollinger,
    })
}

/// Exponentially weighted mean with `alpha = 2 / (span + 1)`, normalized by
/// the sum of weights so early values are not biased toward zero.
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let decay = 1.0 - 2.0 / (span as f64 + 1.0);
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    values
        .iter()
        .map(|value| {
            numerator = value + decay * numerator;
            denominator = 1.0 + decay * denominator;
            numerator / denominator
        })
        .collect()
}

/// Mean of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

fn macd(closes: &[f64]) -> Option<Macd> {
    if closes.len() < 26 {
        return None;
    }
    let fast = ema_series(closes, 12);
    let slow = ema_series(closes, 26);
    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal_series = ema_series(&line, 9);

    let macd = *line.last()?;
    let signal_line = *signal_series.last()?;
    let histogram = macd - signal_line;

    let mut score: f64 = 5.0;
    score += if histogram > 0.0 {
        2.0
    } else if histogram < 0.0 {
        -2.0
    } else {
        -1.0
    };
    score += if macd > 0.0 { 0.5 } else { -0.5 };
    let score = score.clamp(0.0, 10.0);

    Some(Macd {
        macd,
        signal_line,
        histogram,
        signal: Signal::from_score(score),
        score,
    })
}

fn rsi(closes: &[f64], period: usize) -> Option<Rsi> {
    if closes.len() < period + 1 {
        return None;
    }
    let recent = &closes[closes.len() - period - 1..];
    let (gains, losses) = recent
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(gains, losses), delta| {
            if delta > 0.0 {
                (gains + delta, losses)
            } else {
                (gains, losses - delta)
            }
        });

    // A flat window has no direction; report it as neutral.
    let value = match (gains > 0.0, losses > 0.0) {
        (false, false) => 50.0,
        (_, false) => 100.0,
        _ => 100.0 - 100.0 / (1.0 + gains / losses),
    };

    let (score, signal) = if value >= 70.0 {
        (2.0, Signal::Sell)
    } else if value >= 60.0 {
        (4.0, Signal::Hold)
    } else if value >= 40.0 {
        (5.0, Signal::Hold)
    } else if value >= 30.0 {
        (6.0, Signal::Hold)
    } else {
        (8.0, Signal::Buy)
    };

    Some(Rsi {
        value,
        signal,
        score,
        overbought: value > 70.0,
        oversold: value < 30.0,
    })
}

fn moving_averages(closes: &[f64]) -> MovingAverages {
    let price = closes.last().copied().unwrap_or_default();
    let sma_20 = sma(closes, 20);
    let sma_50 = sma(closes, 50);
    let sma_200 = sma(closes, 200);
    let ema_last = |span: usize| {
        (closes.len() >= span)
            .then(|| ema_series(closes, span).last().copied())
            .flatten()
    };
    let ema_12 = ema_last(12);
    let ema_26 = ema_last(26);

    let mut score: f64 = 5.0;
    for (average, weight) in [(sma_20, 0.5), (sma_50, 0.5), (sma_200, 1.0)] {
        if let Some(average) = average {
            score += if price > average { weight } else { -weight };
        }
    }
    if let (Some(fast), Some(slow)) = (ema_12, ema_26) {
        score += if fast > slow { 0.5 } else { -0.5 };
    }
    if let (Some(short), Some(mid), Some(long)) = (sma_20, sma_50, sma_200) {
        if short > mid && mid > long {
            score += 1.0;
        } else if short < mid && mid < long {
            score -= 1.0;
        }
    }
    let score = score.clamp(0.0, 10.0);

    MovingAverages {
        sma_20,
        sma_50,
        sma_200,
        ema_12,
        ema_26,
        signal: Signal::from_score(score),
        score,
    }
}

fn bollinger(closes: &[f64], period: usize, width: f64) -> Option<BollingerBands> {
    let middle = sma(closes, period)?;
    let window = &closes[closes.len() - period..];
    let variance = window
        .iter()
        .map(|close| (close - middle).powi(2))
        .sum::<f64>()
        / (period as f64 - 1.0);
    let deviation = variance.sqrt();
    let upper = middle + deviation * width;
    let lower = middle - deviation * width;
    let price = *closes.last()?;

    let bandwidth = if middle != 0.0 {
        (upper - lower) / middle * 100.0
    } else {
        0.0
    };
    let percent_b = if upper > lower {
        (price - lower) / (upper - lower) * 100.0
    } else {
        50.0
    };

    let (score, signal) = if percent_b >= 100.0 {
        (2.0, Signal::Sell)
    } else if percent_b >= 80.0 {
        (3.0, Signal::Hold)
    } else if percent_b >= 20.0 {
        (5.0, Signal::Hold)
    } else if percent_b >= 0.0 {
        (7.0, Signal::Hold)
    } else {
        (8.0, Signal::Buy)
    };

    Some(BollingerBands {
        upper,
        middle,
        lower,
        bandwidth,
        percent_b,
        squeeze: bandwidth < SQUEEZE_BANDWIDTH,
        signal,
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close_to(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() < 1e-9
    }

    fn rising(count: usize) -> Vec<f64> {
        (0..count).map(|day| 100.0 + day as f64).collect()
    }

    #[test]
    fn too_short_history_has_no_indicators() {
        assert!(technical_indicators(&rising(MIN_CLOSES - 1)).is_none());
        assert!(technical_indicators(&rising(MIN_CLOSES)).is_some());
    }

    #[test]
    fn ema_of_constant_series_is_constant() {
        let ema = ema_series(&[5.0; 30], 12);
        assert!(ema.iter().all(|value| close_to(*value, 5.0)));
    }

    #[test]
    fn ema_weights_recent_values_more() {
        // span 3 -> alpha 0.5: second value is (2 + 0.5 * 1) / 1.5
        let ema = ema_series(&[1.0, 2.0], 3);
        assert!(close_to(ema[1], 2.5 / 1.5));
    }

    #[test]
    fn sma_uses_only_the_trailing_window() {
        assert_eq!(sma(&[1.0, 2.0, 3.0, 4.0], 2), Some(3.5));
        assert_eq!(sma(&[1.0], 2), None);
    }

    #[test]
    fn steady_uptrend_is_overbought_and_bullish_on_averages() {
        let indicators = technical_indicators(&rising(220)).expect("enough history");

        let rsi = indicators.rsi.as_ref().expect("rsi");
        assert_eq!(rsi.value, 100.0);
        assert!(rsi.overbought);
        assert_eq!(rsi.signal, Signal::Sell);

        let averages = &indicators.moving_averages;
        assert!(averages.sma_200.is_some());
        // above all three SMAs, fast EMA over slow, SMAs stacked: 5 + 0.5 + 0.5 + 1 + 0.5 + 1
        assert!(close_to(averages.score, 8.5));
        assert_eq!(averages.signal, Signal::StrongBuy);

        let macd = indicators.macd.as_ref().expect("macd");
        assert!(macd.macd > 0.0);
        assert_eq!(indicators.confidence, 100.0);
        assert_eq!(indicators.bullish + indicators.bearish + indicators.neutral, 4);
    }

    #[test]
    fn flat_prices_are_neutral() {
        let indicators = technical_indicators(&[50.0; 60]).expect("enough history");
        let rsi = indicators.rsi.as_ref().expect("rsi");
        assert_eq!(rsi.value, 50.0);
        let bands = indicators.bollinger.as_ref().expect("bands");
        assert_eq!(bands.percent_b, 50.0);
        assert!(bands.squeeze);
        assert_eq!(indicators.signal, Signal::Hold);
    }

    #[test]
    fn short_history_skips_macd_but_keeps_confidence_honest() {
        let indicators = technical_indicators(&rising(22)).expect("enough history");
        assert!(indicators.macd.is_none());
        assert!(indicators.moving_averages.sma_50.is_none());
        assert_eq!(indicators.confidence, 75.0);
    }

    #[test]
    fn close_below_lower_band_is_a_buy() {
        let mut closes = vec![100.0; 19];
        closes.extend([101.0, 99.0, 100.0, 60.0]);
        let bands = bollinger(&closes, 20, 2.0).expect("bands");
        assert!(bands.percent_b < 0.0);
        assert_eq!(bands.signal, Signal::Buy);
    }

    #[test]
    fn score_maps_onto_signal_bands() {
        assert_eq!(Signal::from_score(8.0), Signal::StrongBuy);
        assert_eq!(Signal::from_score(6.5), Signal::Buy);
        assert_eq!(Signal::from_score(5.0), Signal::Hold);
        assert_eq!(Signal::from_score(2.0), Signal::Sell);
        assert_eq!(Signal::from_score(1.9), Signal::StrongSell);
    }
}
