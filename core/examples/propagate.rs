use tether_core::variables::parse_expression;
use tether_core::{EngineError, Node, System};

fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt::init();

    let mut sys = System::new();
    sys.func("max", |args| args.iter().copied().fold(f64::NEG_INFINITY, f64::max), None)?;

    // Two boxes side by side with a gutter between them
    sys.set("page.width", 800.0)?;
    sys.set("gutter", 16.0)?;
    sys.set("left.left", 0.0)?;
    // Calls only arrive as a tree
    let third = parse_expression("page.width / 3")?;
    let width = sys.evaluate(&Node::call("max", vec![Node::number(200.0), third]))?;
    sys.equals("left.width", width)?;
    sys.set("left.right", "left.left + left.width")?;
    sys.set("right.left", "left.right + gutter")?;
    sys.set("right.width", "page.width - right.left")?;

    let report = sys.solve(1)?;
    println!("{}\n", sys);
    println!(
        "digest {}: {} solved, {} pending, {} passes",
        report.digest, report.solved, report.pending, report.passes
    );
    for name in ["left.width", "left.right", "right.left", "right.width"] {
        println!("{:>12} = {:?}", name, sys.get(name));
    }

    // Narrow the page and re-solve
    sys.set("page.width", 480.0)?;
    sys.next_digest()?;
    println!("\nafter resize: right.width = {:?}", sys.get("right.width"));
    Ok(())
}
