//! Train a Bayesian matrix factorization on synthetic low-rank data and
//! print the per-iteration status lines.
//!
//! ```sh
//! cargo run --example train_synthetic
//! ```

use gibbsmf_core::SparseTensor;
use gibbsmf_kernels::sample_standard_normal;
use gibbsmf_train::{NoiseConfig, PriorKind, ScarceTensorData, StatusItem, TrainConfig, TrainSession};
use scirs2_core::random::{rngs::StdRng, SeedableRng};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let (nrows, ncols, rank) = (200, 120, 4);
    let mut rng = StdRng::seed_from_u64(42);
    let u: Vec<f64> = (0..nrows * rank)
        .map(|_| sample_standard_normal(&mut rng))
        .collect();
    let v: Vec<f64> = (0..ncols * rank)
        .map(|_| sample_standard_normal(&mut rng))
        .collect();

    // observe a random fifth of the cells, with offset and noise
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    let mut vals = Vec::new();
    let mut test = (Vec::new(), Vec::new(), Vec::new());
    for i in 0..nrows {
        for j in 0..ncols {
            if (i * 31 + j * 17) % 5 != 0 {
                continue;
            }
            let dot: f64 = (0..rank).map(|d| u[i * rank + d] * v[j * rank + d]).sum();
            let val = 3.0 + dot + 0.1 * sample_standard_normal(&mut rng);
            if (i + j) % 10 == 0 {
                test.0.push(i);
                test.1.push(j);
                test.2.push(val);
            } else {
                rows.push(i);
                cols.push(j);
                vals.push(val);
            }
        }
    }
    let train = SparseTensor::from_triplets(nrows, ncols, &rows, &cols, &vals)?;
    let test = SparseTensor::from_triplets(nrows, ncols, &test.0, &test.1, &test.2)?;
    println!("train nnz: {}, test nnz: {}", train.nnz(), test.nnz());

    let data = ScarceTensorData::new(
        train,
        NoiseConfig::Adaptive {
            sn_init: 1.0,
            sn_max: 1e4,
        },
    )?;
    let mut config = TrainConfig::new(8, 50, 150, vec![PriorKind::Normal, PriorKind::Normal]);
    config.noise = NoiseConfig::Adaptive {
        sn_init: 1.0,
        sn_max: 1e4,
    };
    config.seed = Some(1234);

    println!("{}", StatusItem::csv_header());
    let mut session = TrainSession::from_config(config, Box::new(data), Some(&test))?;
    session.run()?;

    let status = session.status();
    println!(
        "done: train rmse {:.4}, test rmse (posterior mean) {:.4}",
        status.train_rmse, status.rmse_avg
    );
    Ok(())
}
