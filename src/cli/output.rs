//! CLI Output Formatting.
//!
//! Amounts are printed in whole-token units with their fractional part
//! trimmed; ratios are printed as percentages.

use serde::Serialize;

use crate::protocol::events::ProtocolEvent;
use crate::utils::constants::WAD;

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// Pretty JSON
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FORMATTERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Render a native-decimals amount, e.g. `1500000` with 6 decimals as `1.5`
pub fn format_amount(amount: u128, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let unit = 10u128.pow(u32::from(decimals));
    let whole = amount / unit;
    let fraction = amount % unit;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", fraction, width = decimals as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Render a wad ratio as a percentage with two decimals
pub fn format_ratio(ratio: u128) -> String {
    if ratio == u128::MAX {
        return "inf".to_string();
    }
    let basis_points = ratio / (WAD / 10_000);
    format!("{}.{:02}%", basis_points / 100, basis_points % 100)
}

/// Render a wad price in USD
pub fn format_price(price: u128) -> String {
    format!("${}", format_amount(price, 18))
}

/// One-line summary of an event
pub fn event_line(event: &ProtocolEvent) -> String {
    let detail = match event {
        ProtocolEvent::PriceUpdated(e) => format!("{} = {} (nonce {})", e.symbol, format_price(e.price), e.nonce),
        ProtocolEvent::StableProduced(e) => format!("{} minted {} against {}", e.owner, e.stable_minted, e.symbol),
        ProtocolEvent::PositionLiquidated(e) => {
            format!("{} {} -> lot {} in bucket {}", e.owner, e.symbol, e.lot_id, e.price_index)
        }
        ProtocolEvent::LiquidationSettled(e) => format!(
            "liquidation {} proceeds {} deficit {} closed {}",
            e.liquidation_id, e.proceeds, e.deficit_added, e.closed
        ),
        ProtocolEvent::LotPurchased(e) => format!("lot {} sold {} for {}", e.lot_id, e.collateral_amount, e.cost),
        other => match serde_json::to_value(other) {
            Ok(value) => value.to_string(),
            Err(_) => String::new(),
        },
    };
    format!("[{}] {}: {}", event.timestamp(), event.event_type(), detail)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRINTING
// ═══════════════════════════════════════════════════════════════════════════════

/// Print serializable data in the chosen format
pub fn print_data<T: Serialize + std::fmt::Debug>(format: OutputFormat, data: &T) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(data) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{:?}", data),
        },
        OutputFormat::Text => println!("{:#?}", data),
    }
}

/// Print events, one per line in text mode
pub fn print_events(format: OutputFormat, events: &[ProtocolEvent]) {
    match format {
        OutputFormat::Json => print_data(format, &events),
        OutputFormat::Text => {
            for event in events {
                println!("  {}", event_line(event));
            }
        }
    }
}

/// Print a text table with padded columns
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.len());
            }
        }
    }

    let render = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
    };
    println!("{}", render(headers.to_vec()));
    println!("{}", widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("  "));
    for row in rows {
        println!("{}", render(row.iter().map(String::as_str).collect()));
    }
}
