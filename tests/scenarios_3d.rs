use approx::assert_abs_diff_eq;
use orca_sim::{
    ndarray::{arr1, Array1},
    AgentId, Error, Simulator3d, SimulatorConfig,
};

fn norm(vector: &Array1<f64>) -> f64 {
    vector.dot(vector).sqrt()
}

fn steer(sim: &mut Simulator3d, agents: &[(AgentId, Array1<f64>)]) {
    for (id, goal) in agents {
        let pref = goal - sim.agent_position(*id).unwrap();
        sim.set_agent_pref_velocity(*id, pref).unwrap();
    }
}

#[test]
fn test_two_spheres_stay_point_symmetric() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = SimulatorConfig::new(1.0 / 30.0, 5.0, 5, 1.5, 2.0, 0.4, 2.0);
    let mut sim = Simulator3d::new(config).unwrap();
    let a = sim.add_agent(arr1(&[1.8, 0.05, 0.02])).unwrap();
    let b = sim.add_agent(arr1(&[-1.8, -0.05, -0.02])).unwrap();
    let agents = [
        (a, arr1(&[-1.8, -0.05, -0.02])),
        (b, arr1(&[1.8, 0.05, 0.02])),
    ];

    for _ in 0..150 {
        steer(&mut sim, &agents);
        sim.do_step().unwrap();

        let position_a = sim.agent_position(a).unwrap();
        let position_b = sim.agent_position(b).unwrap();
        for axis in 0..3 {
            assert_abs_diff_eq!(position_a[axis], -position_b[axis], epsilon = 1e-9);
        }
        assert!(norm(&(position_a - position_b)) >= 0.8 - 1e-6);
    }
    assert!(sim.agent_position(a).unwrap()[0] < 0.0);
}

#[test]
fn test_crowd_on_a_sphere_respects_max_speed() {
    let _ = env_logger::builder().is_test(true).try_init();
    let max_speed = 2.0;
    let config = SimulatorConfig::new(1.0 / 30.0, 1.5, 5, 2.0, 2.0, 0.4, max_speed);
    let mut sim = Simulator3d::new(config).unwrap();

    let mut agents = Vec::new();
    for x in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for z in [-1.0, 1.0] {
                let start = arr1(&[x, y, z]) * 1.5;
                let goal = -&start;
                agents.push((sim.add_agent(start).unwrap(), goal));
            }
        }
    }
    sim.add_obstacle(vec![
        arr1(&[-0.2, -0.2, 0.0]),
        arr1(&[0.2, -0.2, 0.0]),
        arr1(&[0.2, 0.2, 0.0]),
        arr1(&[-0.2, 0.2, 0.0]),
    ])
    .unwrap();
    sim.process_obstacles();

    for _ in 0..150 {
        steer(&mut sim, &agents);
        sim.do_step().unwrap();
        for (id, _) in &agents {
            let velocity = sim.agent_velocity(*id).unwrap();
            assert!(velocity.iter().all(|c| c.is_finite()));
            assert!(norm(velocity) <= max_speed + 1e-9);
            assert!(sim.agent_orca_planes(*id).unwrap().len() <= 6);
        }
    }
}

#[test]
fn test_face_errors() {
    let mut sim = Simulator3d::new(SimulatorConfig::default()).unwrap();
    assert!(matches!(
        sim.add_obstacle(vec![
            arr1(&[0.0, 0.0, 0.0]),
            arr1(&[1.0, 0.0, 0.0]),
            arr1(&[2.0, 0.0, 0.0]),
        ]),
        Err(Error::DegenerateGeometry(_))
    ));
    assert_eq!(
        sim.add_obstacle(vec![arr1(&[0.0, 0.0]), arr1(&[1.0, 0.0]), arr1(&[0.0, 1.0])]),
        Err(Error::DimensionMismatch {
            expected: 3,
            found: 2
        })
    );
    assert_eq!(sim.num_obstacles(), 0);
    // nothing registered, nothing to process
    sim.do_step().unwrap();
}
