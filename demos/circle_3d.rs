use std::f64::consts::PI;

use log::info;
use orca_sim::{ndarray::arr1, Error, Simulator3d, SimulatorConfig};

fn main() -> Result<(), Error> {
    env_logger::init();

    let config = SimulatorConfig::new(1.0 / 30.0, 1.5, 5, 2.0, 2.0, 0.4, 2.0);
    let mut sim = Simulator3d::new(config)?;

    // two rings of five, the lower one rotated by half a step
    let mut goals = Vec::new();
    for i in 0..10 {
        let angle = PI * i as f64 / 5.0;
        let height = if i % 2 == 0 { 0.3 } else { -0.3 };
        let start = arr1(&[1.8 * angle.cos(), 1.8 * angle.sin(), height]);
        let goal = -&start;
        goals.push((sim.add_agent(start)?, goal));
    }

    for _ in 0..150 {
        for (id, goal) in &goals {
            let pref = goal - sim.agent_position(*id)?;
            sim.set_agent_pref_velocity(*id, pref)?;
        }
        sim.do_step()?;
    }

    for (id, goal) in &goals {
        let position = sim.agent_position(*id)?;
        info!("agent {} ended at {} (goal {})", id, position, goal);
        println!(
            "{} ({:.3}, {:.3}, {:.3})",
            id, position[0], position[1], position[2]
        );
    }
    Ok(())
}
