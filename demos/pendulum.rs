extern crate nalgebra as na;
use std::f64::consts::PI;

use amppi::{
    Amppi, AmppiConfig, Costs, ForwardModel, MerweScaled, ParamsDist, ParamsSampling,
    PendulumModel, Uncertainty,
};
use ndarray::{array, Array1, ArrayView2};

// cargo run --example pendulum --release -- [none|single|extended|transform]

// 予測ホライゾン
const HORIZON: usize = 20;
// サンプル数
const K: usize = 200;
const LAMBDA: f64 = 1.0;
const NOISE_VAR: f64 = 1.5;

// 真の系のパラメータ (モデルは不確かさを持つ)
const TRUE_MASS: f64 = 1.3;
const TRUE_LENGTH: f64 = 0.9;

const STEPS: usize = 200;

fn angle_normalize(x: f64) -> f64 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

fn inst_cost(x: ArrayView2<f64>) -> Array1<f64> {
    x.outer_iter()
        .map(|s| angle_normalize(s[0]).powi(2) + 0.1 * s[1].powi(2))
        .collect()
}

fn term_cost(x: ArrayView2<f64>) -> Array1<f64> {
    inst_cost(x) * 10.0
}

fn main() -> anyhow::Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;

    let mode = std::env::args().nth(1).unwrap_or_else(|| "transform".into());
    let params_sampling = match mode.as_str() {
        "transform" => ParamsSampling::transform(MerweScaled::with_dim(2)?),
        other => other.parse()?,
    };

    let dist = ParamsDist::diagonal(na::dvector![1.0, 1.0], na::dvector![0.04, 0.02])?;
    let model = PendulumModel::default()
        .with_uncertainty(Uncertainty::new(["mass", "length"], dist)?)?;
    let plant = PendulumModel::new(PendulumModel::DT, 9.8, TRUE_MASS, TRUE_LENGTH)?;

    let config = AmppiConfig {
        horizon: HORIZON,
        n_samples: K,
        lambda: LAMBDA,
        noise_cov: Some(na::dmatrix![NOISE_VAR]),
        params_sampling,
        params_bounds: (0.1, 5.0),
        ..Default::default()
    };
    log::info!("params sampling: {:?}", config.params_sampling);
    let mut mppi = Amppi::new(
        config,
        model.observation_space(),
        model.action_space().clone(),
        Costs::new(inst_cost, term_cost),
    )?;

    // ログファイルの作成
    std::fs::create_dir_all("logs")?;
    let file_path = format!(
        "logs/pendulum-{mode}-{}.csv",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    );
    let mut wtr = csv::Writer::from_path(&file_path)?;
    wtr.write_record(["t", "u", "theta", "theta_d", "cost"])?;

    // 真下から振り上げ
    let mut x = array![PI, 0.0];
    let now = std::time::Instant::now();
    for i in 0..STEPS {
        let t = i as f64 * plant.dt();
        let (u, outcome) = mppi.step(&model, x.view())?;
        let next = plant.step(
            x.view().insert_axis(ndarray::Axis(0)),
            u.view().insert_axis(ndarray::Axis(0)),
            None,
        );
        x = next.row(0).to_owned();

        println!(
            "t: {:.2}, u: {:6.2}, x: [{:6.2}, {:5.2}], cost: {:8.2}",
            t,
            u[0],
            angle_normalize(x[0]),
            x[1],
            outcome.cost()
        );
        wtr.write_record(&[
            t.to_string(),
            u[0].to_string(),
            x[0].to_string(),
            x[1].to_string(),
            outcome.cost().to_string(),
        ])?;
    }
    wtr.flush()?;
    println!("elapsed: {:.2} sec", now.elapsed().as_secs_f64());
    println!("log: {file_path}");
    Ok(())
}
