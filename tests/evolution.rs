use stride::config;
use stride::morphology::MorphologyParams;
use stride::population::Population;
use stride::sandbox::Sandbox;
use stride::save_load;

#[test]
fn several_generations_run_end_to_end() {
    let mut world = Sandbox::new(config::ARENA_WIDTH, config::GROUND_Y);
    let morphology = MorphologyParams::default()
        .resolve(config::ARENA_WIDTH, config::ARENA_HEIGHT)
        .unwrap();
    let mut pop = Population::new(6, morphology, 2024).unwrap();
    pop.attach_all(&mut world).unwrap();

    for expected_generation in 1..=3 {
        pop.run_episode(&mut world, 90).unwrap();

        let best_score = pop.best().score;
        assert!(pop.agents().iter().all(|a| a.score <= best_score));

        let summary = pop.evolve(&mut world).unwrap();
        assert_eq!(summary.generation, expected_generation);
        assert_eq!(summary.best_score, best_score);
        assert!((summary.fitness.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(summary.fitness.iter().all(|f| (0.0..=1.0).contains(f)));

        assert_eq!(pop.agents().len(), 6);
        assert_eq!(world.body_count(), 6 * 3);
        assert_eq!(world.joint_count(), 6 * 4);
    }

    assert_eq!(pop.generation(), 4);
    assert_eq!(pop.stats.best_score.len(), 3);
    assert!(pop.stats.all_time_best.is_some());
}

#[test]
fn best_controller_survives_a_json_roundtrip() {
    let mut world = Sandbox::new(config::ARENA_WIDTH, config::GROUND_Y);
    let morphology = MorphologyParams::default()
        .resolve(config::ARENA_WIDTH, config::ARENA_HEIGHT)
        .unwrap();
    let mut pop = Population::new(3, morphology, 7).unwrap();
    pop.attach_all(&mut world).unwrap();
    pop.run_episode(&mut world, 30).unwrap();

    let best = pop.best();
    let json = save_load::controller_to_json(best.brain()).unwrap();
    let restored = save_load::controller_from_json(&json).unwrap();

    let inputs = best.sense(&world).unwrap();
    assert_eq!(
        restored.predict(&inputs).unwrap(),
        best.brain().predict(&inputs).unwrap()
    );
}
