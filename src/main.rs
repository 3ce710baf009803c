//! Walkthrough of the lazy tensor API: devices, tensors, lazy UOp graphs,
//! realization and node sharing.

use clap::Parser;
use lazygrad::serialization::{self, GraphFormat};
use lazygrad::{logging, Config, Device, GraphContext, Tensor};
use std::cell::RefCell;
use std::rc::Rc;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "lazygrad: lazy tensors on a UOp graph", long_about = None)]
struct Args {
    /// Default compute device (overrides $DEVICE)
    #[arg(long)]
    device: Option<Device>,

    /// Verbosity level (overrides $DEBUG)
    #[arg(long)]
    debug: Option<u8>,

    /// Dump the final graph to stdout: json or dot
    #[arg(long)]
    graph: Option<GraphFormat>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(device) = args.device {
        config = config.with_device(device);
    }
    if let Some(debug) = args.debug {
        config = config.with_debug(debug);
    }
    logging::init(config.debug);

    run_walkthrough(config, args.graph)
}

fn run_walkthrough(config: Config, dump: Option<GraphFormat>) -> Result<(), Box<dyn std::error::Error>> {
    // ---------- 1. Devices ----------
    let context = Rc::new(RefCell::new(GraphContext::with_config(config)?));
    println!("[1] Default device: {}", context.borrow().default_device());

    // ---------- 2. A tensor ----------
    let t = Tensor::new(&context, &[1, 2, 3, 4]);
    println!(
        "[2] Tensor on {}, dtype {}, shape {:?}",
        t.device(),
        t.dtype(),
        t.shape()
    );

    // ---------- 3. Tensors are lazy ----------
    println!("[3] {}", t);
    println!("{}", t.uop_repr()?);

    // ---------- 4. Realization turns the node into a buffer ----------
    t.realize()?;
    println!("[4] After realize:");
    println!("{}", t.uop_repr()?);

    // ---------- 5. Operations build graphs ----------
    let t_times_2 = &t * 2;
    println!("[5] t * 2 before realization:");
    println!("{}", t_times_2.uop_repr()?);
    let values = t_times_2.to_vec::<i32>()?;
    println!("    t * 2 = {:?}", values);
    if values != [2, 4, 6, 8] {
        return Err(format!("expected [2, 4, 6, 8], got {:?}", values).into());
    }

    // ---------- 6. Identical computations share one node ----------
    let vv1 = &t * 4;
    let vv2 = &t * 4;
    println!(
        "[6] Same handle: {}, same UOp: {} ({} and {})",
        std::ptr::eq(&vv1, &vv2),
        vv1.uop() == vv2.uop(),
        vv1.uop(),
        vv2.uop()
    );
    vv1.realize()?;
    println!("    vv1 realized, vv2 realized: {}", vv2.is_realized());
    let before = context.borrow().stats();
    let values = vv2.to_vec::<i32>()?;
    let after = context.borrow().stats();
    println!(
        "    vv2 = {:?} with {} new kernel(s)",
        values,
        after.kernels - before.kernels
    );

    if let Some(format) = dump {
        let ctx = context.borrow();
        let roots = [t.uop(), t_times_2.uop(), vv1.uop()];
        println!("{}", serialization::export(ctx.graph(), &roots, format)?);
    }

    let ctx = context.borrow();
    let stats = ctx.stats();
    println!(
        "\n--- {} node(s), {} cache hit(s), {} kernel(s), {} cop(ies), {} buffer byte(s) ---",
        ctx.graph().len(),
        ctx.graph().cache_hits(),
        stats.kernels,
        stats.copies,
        ctx.buffers().total_bytes()
    );
    Ok(())
}
