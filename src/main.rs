use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};

use dense_kernels::core::DeviceBuffer;
use dense_kernels::{Activation, Device, DeviceConfig, Network};

/// Train a small network on XOR with the device kernels
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Training epochs (one batch of all four samples per epoch)
    #[arg(short, long, default_value_t = 2000)]
    epochs: usize,

    #[arg(short, long, default_value_t = 0.5)]
    learn_rate: f32,

    /// Neurons in the hidden layer
    #[arg(long, default_value_t = 4)]
    hidden: usize,

    /// Hidden layer activation code: 0 linear, 1 relu, 2 tanh, 3 sigmoid, 4 pn-sigmoid
    #[arg(long, default_value_t = 2)]
    hidden_activation: u32,

    /// Seed for weight initialisation, random when omitted
    #[arg(short, long)]
    seed: Option<u64>,

    /// JSON device config ({"threads": .., "max_group_lanes": ..})
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DeviceConfig::from_file(path).unwrap_or_else(|e| {
            warn!("{}, using the default device config", e);
            DeviceConfig::default()
        }),
        None => DeviceConfig::default(),
    };
    let device = Device::new(&config)?;

    let seed = args.seed.unwrap_or_else(rand::random::<u64>);
    info!("Seed {}", seed);

    let hidden_activation = Activation::from(args.hidden_activation);
    info!("Hidden layer: {} x {:?}", args.hidden, hidden_activation);
    let mut network = Network::new(2, &[(args.hidden, hidden_activation), (1, Activation::Linear)])?;
    network.randomize(&device, seed)?;

    let samples: [[f32; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
    let inputs = DeviceBuffer::from_slice(samples.as_flattened());
    let targets = DeviceBuffer::from_slice(&[0.0, 1.0, 1.0, 0.0]);
    let batch = samples.len();

    let report_every = (args.epochs / 10).max(1);
    for epoch in 0..args.epochs {
        let cost = network.train_batch(&device, &inputs, &targets, batch, args.learn_rate)?;
        if epoch % report_every == 0 {
            info!("Epoch {:>5}: cost {:.6}", epoch, cost);
        }
    }

    let predictions = network.predict(&device, &inputs, batch)?;
    let cost = network.cost(&device, &targets, batch)?;
    info!("Final cost {:.6}", cost);
    for (sample, prediction) in samples.iter().zip(&predictions) {
        println!("{} xor {} -> {:.4}", sample[0], sample[1], prediction);
    }
    Ok(())
}
