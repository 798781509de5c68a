use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use nxtlink_service::ClientError;
use serde::Serialize;

/// Distance reported when nothing is in range.
pub const OUT_OF_RANGE: u8 = 255;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
pub struct ReadingOutput {
    pub port: u8,
    pub distance_cm: Option<u8>,
    pub in_range: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl ReadingOutput {
    pub fn new(port: u8, reading: &Result<u8, ClientError>) -> Self {
        let (distance_cm, error) = match reading {
            Ok(value) => (Some(*value), None),
            Err(err) => (None, Some(err.to_string())),
        };
        Self {
            port,
            distance_cm,
            in_range: matches!(distance_cm, Some(d) if d != OUT_OF_RANGE),
            error,
            timestamp: now_unix_seconds(),
        }
    }

    fn distance_text(&self) -> String {
        match (self.distance_cm, &self.error) {
            (Some(OUT_OF_RANGE), _) => "out of range".to_string(),
            (Some(d), _) => format!("{d} cm"),
            (None, Some(err)) => format!("error: {err}"),
            (None, None) => "-".to_string(),
        }
    }
}

/// Print one sweep of readings.
pub fn print_readings(readings: &[ReadingOutput], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for reading in readings {
                print_json(reading);
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "DISTANCE"]);
            for reading in readings {
                table.add_row(vec![reading.port.to_string(), reading.distance_text()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = readings
                .iter()
                .map(|r| format!("port {}: {}", r.port, r.distance_text()))
                .collect::<Vec<_>>()
                .join("  ");
            println!("{line}");
        }
    }
}

#[derive(Serialize)]
pub struct MotorOutput {
    pub motor: i32,
    pub power: i32,
    pub timestamp: String,
}

pub fn print_motor(motor: i32, power: i32, format: OutputFormat) {
    let out = MotorOutput {
        motor,
        power,
        timestamp: now_unix_seconds(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["MOTOR", "POWER"])
                .add_row(vec![motor_name(motor), format!("{power}%")]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("motor {} power {power}%", motor_name(motor)),
    }
}

pub fn motor_name(motor: i32) -> String {
    match motor {
        0 => "A".to_string(),
        1 => "B".to_string(),
        2 => "C".to_string(),
        other => other.to_string(),
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_reading_is_not_in_range() {
        let reading = ReadingOutput::new(3, &Ok(OUT_OF_RANGE));
        assert_eq!(reading.distance_cm, Some(255));
        assert!(!reading.in_range);
        assert_eq!(reading.distance_text(), "out of range");
    }

    #[test]
    fn failed_reading_carries_error() {
        let reading = ReadingOutput::new(0, &Err(ClientError::Unavailable));
        assert_eq!(reading.distance_cm, None);
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["error"], "connection service unavailable");
    }
}
