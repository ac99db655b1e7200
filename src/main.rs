//! Demo: position loop around a DC motor
//!
//! A constant planner feeds a PI controller with filtered derivative that
//! drives a second-order motor model. Run with `RUST_LOG=info` to see the
//! simulator's progress messages.

use std::collections::BTreeMap;

use sigflow::library::{ConstantBlock, MotorBlock, PIrDBlock};
use sigflow::{
    BlockDefinition, BlockSet, Diagram, Error, OutputGroup, ParameterSet, Registry, Settings,
    SettingsOverrides, Simulator, SolverKind, Tick,
};

fn definitions() -> Vec<BlockDefinition> {
    vec![
        BlockDefinition::new("motor", "examples.Motor")
            .with_parameters(ParameterSet::new().with("x", vec![0.0, 0.0]).with("friction", 1.0)),
        BlockDefinition::new("planner", "planners.Constant")
            .with_parameters(ParameterSet::new().with("setpoint", 1.0)),
        BlockDefinition::new("controller", "controllers.PIrD")
            .with_parameters(ParameterSet::new().with("Kp", 1.0).with("Ki", 0.0).with("Kd", 0.2)),
    ]
}

fn signal_flow(blocks: &mut BlockSet, tick: Tick) -> Result<Vec<OutputGroup>, Error> {
    let phi = blocks.typed::<MotorBlock>("motor")?.output()[0];

    let planner = blocks.typed_mut::<ConstantBlock>("planner")?;
    let reference = planner.call(tick, ())?;
    let reference_fields = planner.output_fields();

    let controller = blocks.typed_mut::<PIrDBlock>("controller")?;
    let u = controller.call(tick, reference - phi)?;
    let u_fields = controller.output_fields();

    let motor = blocks.typed_mut::<MotorBlock>("motor")?;
    let trajectory = motor.call(tick.t, u)?;

    Ok(vec![
        trajectory.time_group("t"),
        trajectory.state_group(motor.state_fields()),
        OutputGroup::single(u_fields, &[u]),
        OutputGroup::single(reference_fields, &[reference]),
    ])
}

fn main() -> Result<(), Error> {
    env_logger::init();

    let loader = || -> Result<_, Error> {
        let diagram = Diagram::build("servo", &Registry::with_library(), &definitions(), &BTreeMap::new(), signal_flow)?;
        Ok(diagram.with_settings(
            SettingsOverrides::default()
                .solver(SolverKind::Rk45)
                .t_end(20.0)
                .sample_time(0.5),
        ))
    };

    let mut simulator = Simulator::load(loader, Settings::default())?;
    let data = simulator.run(None)?;

    println!("Logged {} rows [{}]", data.len(), data.schema());
    for row in data.rows().step_by(10) {
        let value = |name: &str| row.get(name).map(|v| v.as_f64()).unwrap_or(f64::NAN);
        println!(
            "t={:7.3}  phi={:8.4}  u={:8.4}  r={:.1}",
            value("t"),
            value("phi"),
            value("u"),
            value("r")
        );
    }

    if let Some(failure) = simulator.failure() {
        eprintln!("{}", failure);
    }
    Ok(())
}
