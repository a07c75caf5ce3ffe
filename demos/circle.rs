use std::f64::consts::PI;

use log::info;
use orca_sim::{ndarray::arr1, Error, Simulator, SimulatorConfig};

fn main() -> Result<(), Error> {
    env_logger::init();

    let config = SimulatorConfig::new(1.0 / 30.0, 1.5, 5, 1.5, 2.0, 0.4, 2.0);
    let mut sim = Simulator::new(config)?;

    let mut goals = Vec::new();
    for i in 0..5 {
        let angle = 2.0 * PI * i as f64 / 5.0;
        let start = arr1(&[1.8 * angle.cos(), 1.8 * angle.sin()]);
        let goal = -&start;
        goals.push((sim.add_agent(start)?, goal));
    }
    sim.add_obstacle(vec![
        arr1(&[0.3, 0.3]),
        arr1(&[-0.3, 0.3]),
        arr1(&[-0.3, -0.3]),
        arr1(&[0.3, -0.3]),
    ])?;
    sim.process_obstacles();

    for _ in 0..150 {
        for (id, goal) in &goals {
            let pref = goal - sim.agent_position(*id)?;
            sim.set_agent_pref_velocity(*id, pref)?;
        }
        sim.do_step()?;

        let positions = goals
            .iter()
            .map(|(id, _)| {
                let position = sim.agent_position(*id)?;
                Ok(format!("({:.3}, {:.3})", position[0], position[1]))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        println!("{:.3} {}", sim.global_time(), positions.join(" "));
    }

    for (id, goal) in &goals {
        info!(
            "agent {} ended at {} (goal {})",
            id,
            sim.agent_position(*id)?,
            goal
        );
    }
    Ok(())
}
