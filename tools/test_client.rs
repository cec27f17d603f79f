//! Test Prediction Client
//!
//! Generates loan applications and sends them to the server through every
//! route and input encoding it accepts.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

const ROUTES: [&str; 3] = [
    "/predict",
    "/api/v1.0/predictions",
    "/v1/models/loan-approval/predict",
];

/// Loan application matching the server's feature record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoanApplication {
    age: u32,
    income: u32,
    education: u32,
    experience: u32,
    credit_score: u32,
}

impl LoanApplication {
    fn as_row(&self) -> [u32; 5] {
        [
            self.age,
            self.income,
            self.education,
            self.experience,
            self.credit_score,
        ]
    }
}

/// Request body encodings the server accepts
#[derive(Debug, Clone, Copy)]
enum Encoding {
    Direct,
    Positional,
    Instances,
    NdArray,
}

impl Encoding {
    const ALL: [Encoding; 4] = [
        Encoding::Direct,
        Encoding::Positional,
        Encoding::Instances,
        Encoding::NdArray,
    ];

    fn encode(&self, application: &LoanApplication) -> Value {
        match self {
            Encoding::Direct => json!(application),
            Encoding::Positional => json!(application.as_row()),
            Encoding::Instances => json!({ "instances": [application] }),
            Encoding::NdArray => json!({
                "data": {
                    "names": ["age", "income", "education", "experience", "credit_score"],
                    "ndarray": [application.as_row()]
                }
            }),
        }
    }
}

/// Application generator for testing
struct ApplicationGenerator {
    rng: rand::rngs::ThreadRng,
}

impl ApplicationGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Generate an application from a well-qualified applicant
    fn generate_strong(&mut self) -> LoanApplication {
        let age = self.rng.gen_range(28..60);
        LoanApplication {
            age,
            income: self.rng.gen_range(60_000..200_000),
            education: self.rng.gen_range(14..21),
            experience: self.rng.gen_range(3..(age - 20)),
            credit_score: self.rng.gen_range(680..850),
        }
    }

    /// Generate an application likely to be denied
    fn generate_risky(&mut self) -> LoanApplication {
        let age = self.rng.gen_range(18..30);
        LoanApplication {
            age,
            income: self.rng.gen_range(12_000..40_000),
            education: self.rng.gen_range(8..13),
            experience: self.rng.gen_range(0..(age - 16)),
            credit_score: self.rng.gen_range(300..600),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_client=info".parse()?),
        )
        .init();

    info!("Starting Test Prediction Client");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let base_url = args
        .get(1)
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|| "http://localhost:9000".to_string());
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(30);
    let risky_rate = parse_risky_rate(args.get(3).map(String::as_str));
    let delay_ms: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        base_url = %base_url,
        count = count,
        risky_rate = risky_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;

    match client.get(format!("{}/health", base_url)).send().await {
        Ok(response) => {
            let health: Value = response.json().await.unwrap_or(Value::Null);
            info!(status = %health["status"], "Server reachable");
        }
        Err(e) => {
            warn!(error = %e, "Server unreachable. Running in dry-run mode.");
            return run_dry_mode(count, risky_rate, delay_ms).await;
        }
    }

    let mut generator = ApplicationGenerator::new();
    let mut rng = rand::thread_rng();

    let mut succeeded = 0;
    let mut failed = 0;

    for i in 0..count {
        let application = if rng.gen_bool(risky_rate) {
            generator.generate_risky()
        } else {
            generator.generate_strong()
        };
        let route = ROUTES[i as usize % ROUTES.len()];
        let encoding = Encoding::ALL[i as usize % Encoding::ALL.len()];

        let response = client
            .post(format!("{}{}", base_url, route))
            .json(&encoding.encode(&application))
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                let body: Value = response.json().await.unwrap_or(Value::Null);
                if status.is_success() {
                    succeeded += 1;
                    info!(route = route, encoding = ?encoding, response = %body, "Prediction");
                } else {
                    failed += 1;
                    warn!(route = route, status = %status, response = %body, "Prediction rejected");
                }
            }
            Err(e) => {
                failed += 1;
                warn!(route = route, error = %e, "Request failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} applications ({} succeeded, {} failed)",
        count, succeeded, failed
    );

    Ok(())
}

/// Share of risky applications, a probability in [0, 1]
fn parse_risky_rate(arg: Option<&str>) -> f64 {
    const DEFAULT: f64 = 0.3;
    let Some(arg) = arg else {
        return DEFAULT;
    };
    match arg.parse::<f64>() {
        Ok(rate) if (0.0..=1.0).contains(&rate) => rate,
        _ => {
            warn!(value = arg, "Risky rate must be between 0 and 1, using {}", DEFAULT);
            DEFAULT
        }
    }
}

async fn run_dry_mode(count: u64, risky_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no server connection)");

    let mut generator = ApplicationGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let application = if rng.gen_bool(risky_rate) {
            generator.generate_risky()
        } else {
            generator.generate_strong()
        };
        let encoding = Encoding::ALL[i as usize % Encoding::ALL.len()];

        if (i + 1) % 10 == 0 || i == 0 {
            let json = serde_json::to_string_pretty(&encoding.encode(&application))?;
            info!("Sample request {} ({:?}):\n{}", i + 1, encoding, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
