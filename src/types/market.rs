use serde::Deserialize;

// Raw record from the pricing service's `/coins/markets` endpoint.
// Every numeric field may be null upstream.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MarketRecord {
    pub id: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_7d_in_currency: Option<f64>,
    #[serde(default)]
    pub total_volume: Option<f64>,
}

impl MarketRecord {
    /// Price usable for the catalog: present, finite and strictly positive.
    pub fn usable_price(&self) -> Option<f64> {
        self.current_price
            .filter(|price| price.is_finite() && *price > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_market_record_with_nulls() {
        let raw = r#"[{"id":"cosmos","symbol":"atom","current_price":8.5,"price_change_percentage_24h":null,"total_volume":1200.0},
                      {"id":"ghost","symbol":"gst","current_price":null}]"#;
        let records: Vec<MarketRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].usable_price(), Some(8.5));
        assert_eq!(records[0].price_change_percentage_24h, None);
        assert_eq!(records[1].usable_price(), None);
    }

    #[test]
    fn test_zero_price_is_not_usable() {
        let record = MarketRecord {
            id: "dead".to_string(),
            current_price: Some(0.0),
            ..Default::default()
        };
        assert_eq!(record.usable_price(), None);
    }
}
