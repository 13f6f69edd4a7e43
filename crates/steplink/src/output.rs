use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use steplink_codec::MotorStatus;

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
struct StatusOutput<'a> {
    connected: bool,
    timestamp: String,
    #[serde(flatten)]
    status: &'a MotorStatus,
}

pub fn print_status(status: &MotorStatus, connected: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = StatusOutput {
                connected,
                timestamp: now_unix_seconds(),
                status,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "AXIS",
                    "SPEED (deg/s)",
                    "ANGLE (deg)",
                    "TARGET (deg)",
                    "ROTATING",
                    "DIR",
                ]);
            for (i, axis) in status.axes.iter().enumerate() {
                table.add_row(vec![
                    (i + 1).to_string(),
                    format!("{:.2}", axis.speed),
                    format!("{:.3}", axis.angle),
                    format!("{:.3}", axis.target_angle),
                    if axis.rotating { "yes" } else { "no" }.to_string(),
                    if axis.dir == 1 { "cw" } else { "ccw" }.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (i, axis) in status.axes.iter().enumerate() {
                println!(
                    "axis{} speed={:.2} angle={:.3} target={:.3} rotating={} dir={}",
                    i + 1,
                    axis.speed,
                    axis.angle,
                    axis.target_angle,
                    axis.rotating,
                    axis.dir
                );
            }
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
