use clap::{Parser, Subcommand};
use qcsi_core::{
    AliveWindow, FeatureCatalog, FeatureValue, MaskMart, QcsiModel, ScalarValue, ScoreModel,
};
use std::collections::BTreeMap;

#[derive(Parser)]
#[command(name = "qcsi")]
#[command(about = "qCSI severity score toolkit CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine an oxygen device and flow rate from treatment text
    Mine {
        /// Treatment text, e.g. "O2 nasal 3l/min use"
        text: String,
    },
    /// Parse a data-alive-time literal and print the window start
    Window {
        /// Look-back literal (YYYY-MM-DDThh:mm:ss, fields are magnitudes)
        literal: String,
    },
    /// Load a feature table and print its models
    Table {
        /// Path of the feature table CSV
        path: String,
        /// Only print this model's features
        #[arg(long)]
        model: Option<String>,
    },
    /// Score hand-entered vitals with the qCSI model
    Score {
        /// Respiratory rate in breaths per minute
        #[arg(long)]
        respiratory_rate: Option<f64>,
        /// Pulse oximetry in percent
        #[arg(long)]
        spo2: Option<f64>,
        /// Oxygen flow rate in L/min, or treatment text to mine
        #[arg(long)]
        o2_flow_rate: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Mine { text }) => {
            let mart = MaskMart::standard()?;
            match mart.treatment_mining(&text) {
                Some(result) => println!(
                    "Device: {}, {}: {}",
                    result.device, result.unit, result.value
                ),
                None => println!("No oxygen device recognised in the text."),
            }
        }
        Some(Commands::Window { literal }) => {
            match AliveWindow::parse(&literal)
                .and_then(|window| window.window_start(chrono::Utc::now()))
            {
                Ok(start) => println!("Window start: {}", start),
                Err(e) => eprintln!("Error parsing window: {}", e),
            }
        }
        Some(Commands::Table { path, model }) => {
            let catalog = FeatureCatalog::from_csv_path(&path)?;
            match model {
                Some(name) => match catalog.get_model(&name) {
                    Ok(definitions) => {
                        for (feature, definition) in definitions {
                            println!(
                                "{}: code {}, type {}, alive {}",
                                feature,
                                definition.code(),
                                definition.type_of_data(),
                                definition.alive_window()
                            );
                        }
                    }
                    Err(e) => eprintln!("Error reading model: {}", e),
                },
                None => {
                    for name in catalog.model_names() {
                        println!("{}", name);
                    }
                }
            }
        }
        Some(Commands::Score {
            respiratory_rate,
            spo2,
            o2_flow_rate,
        }) => {
            let mut features = BTreeMap::new();
            if let Some(rate) = respiratory_rate {
                features.insert(
                    "respiratory_rate".to_string(),
                    FeatureValue {
                        date: None,
                        value: ScalarValue::Num(rate),
                    },
                );
            }
            if let Some(saturation) = spo2 {
                features.insert(
                    "spo2".to_string(),
                    FeatureValue {
                        date: None,
                        value: ScalarValue::Num(saturation),
                    },
                );
            }
            if let Some(flow_rate) = o2_flow_rate {
                let value = match flow_rate.parse::<f64>() {
                    Ok(rate) => ScalarValue::Num(rate),
                    Err(_) => ScalarValue::Text(flow_rate),
                };
                features.insert("o2_flow_rate".to_string(), FeatureValue { date: None, value });
            }

            let model = QcsiModel::new(MaskMart::standard()?);
            match model.score(&mut features) {
                Ok(score) => {
                    for (feature, value) in &features {
                        match &value.value {
                            ScalarValue::Num(number) => println!("{}: {}", feature, number),
                            ScalarValue::Text(text) => println!("{}: {}", feature, text),
                            ScalarValue::Bool(flag) => println!("{}: {}", feature, flag),
                        }
                    }
                    println!("qCSI score: {}", score);
                }
                Err(e) => eprintln!("Error scoring vitals: {}", e),
            }
        }
        None => {
            println!("Use 'qcsi --help' for commands");
        }
    }

    Ok(())
}
