use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct City {
    pub id: String,
    pub label: String,
    pub lat: f64,
    pub lon: f64,
    pub units: String,
    pub priority: i64,
    pub enabled: bool,
}
