use qdkit::{
    shared, Archive, ArchiveHandle, Bounds, CmaEsEmitter, Emitter, GaussianEmitter, GridArchive,
    IsoLineEmitter, RankingPolicy, Selection,
};

fn unit_archive(solution_dim: usize) -> ArchiveHandle {
    shared(GridArchive::new(solution_dim, &[20, 20], &[(0.0, 1.0), (0.0, 1.0)]).unwrap())
}

// Hand-rolled ask/evaluate/tell loop; objective rewards distance from
// the center and uses the (clamped) solution itself as the measure.
fn drive<E: Emitter>(em: &mut E, batches: usize, batch_size: usize) {
    for _ in 0..batches {
        let solutions = em.ask(batch_size);
        let objectives: Vec<f64> = solutions
            .iter()
            .map(|x| (x[0] - 0.5).abs() + (x[1] - 0.5).abs())
            .collect();
        let measures: Vec<Vec<f64>> = solutions.clone();
        em.tell(&solutions, &objectives, &measures).unwrap();
    }
}

#[test]
fn gaussian_fills_archive_within_bounds() {
    let archive = unit_archive(2);
    let mut em = GaussianEmitter::new(
        archive.clone(),
        0.1,
        vec![0.5, 0.5],
        Bounds::Uniform(0.0, 1.0),
        Some(42),
    )
    .unwrap();
    drive(&mut em, 50, 10);
    let arch = archive.borrow();
    assert!(arch.len() > 1, "archive did not diversify: {}", arch.len());
    for e in arch.elites() {
        assert!(e.solution.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}

#[test]
fn isoline_fills_archive_within_bounds() {
    let archive = unit_archive(2);
    let mut em = IsoLineEmitter::new(
        archive.clone(),
        0.05,
        0.2,
        vec![0.5, 0.5],
        Bounds::Uniform(0.0, 1.0),
        Some(42),
    )
    .unwrap();
    drive(&mut em, 50, 10);
    let arch = archive.borrow();
    assert!(arch.len() > 1, "archive did not diversify: {}", arch.len());
    for e in arch.elites() {
        assert!(e.solution.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}

#[test]
fn cmaes_fills_archive_within_bounds() {
    let archive = unit_archive(2);
    let mut em = CmaEsEmitter::new(
        archive.clone(),
        0.2,
        vec![0.5, 0.5],
        Bounds::Uniform(0.0, 1.0),
        Some(42),
    )
    .unwrap();
    let lambda = em.lambda();
    drive(&mut em, 40, lambda);
    let arch = archive.borrow();
    assert!(arch.len() > 1, "archive did not diversify: {}", arch.len());
    for e in arch.elites() {
        assert!(e.solution.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}

#[test]
fn cmaes_all_ranking_policies_populate() {
    for policy in [
        RankingPolicy::Objective,
        RankingPolicy::TwoStageObjective,
        RankingPolicy::Improvement,
        RankingPolicy::TwoStageImprovement,
        RankingPolicy::RandomDirection,
        RankingPolicy::TwoStageRandomDirection,
    ] {
        let archive = unit_archive(2);
        let mut em = CmaEsEmitter::new(
            archive.clone(),
            0.2,
            vec![0.5, 0.5],
            Bounds::Uniform(0.0, 1.0),
            Some(13),
        )
        .unwrap()
        .with_ranking(policy);
        let lambda = em.lambda();
        drive(&mut em, 10, lambda);
        assert!(
            !archive.borrow().is_empty(),
            "{policy:?} never populated the archive"
        );
    }
}

#[test]
fn cmaes_filter_selection_runs() {
    let archive = unit_archive(2);
    let mut em = CmaEsEmitter::new(
        archive.clone(),
        0.2,
        vec![0.5, 0.5],
        Bounds::Uniform(0.0, 1.0),
        Some(29),
    )
    .unwrap()
    .with_selection(Selection::Filter);
    let lambda = em.lambda();
    drive(&mut em, 20, lambda);
    assert!(!archive.borrow().is_empty());
}

#[test]
fn seeded_emitters_are_reproducible() {
    let run = || {
        let archive = unit_archive(2);
        let mut em = GaussianEmitter::new(
            archive.clone(),
            0.1,
            vec![0.5, 0.5],
            Bounds::Uniform(0.0, 1.0),
            Some(1234),
        )
        .unwrap();
        drive(&mut em, 30, 8);
        let elites = archive.borrow().elites();
        elites
    };
    assert_eq!(run(), run());
}

#[test]
fn unbounded_emitters_allow_any_offspring() {
    let archive = unit_archive(2);
    let mut em =
        GaussianEmitter::new(archive, 0.3, vec![0.5, 0.5], Bounds::None, Some(5)).unwrap();
    // Nothing to assert about range; the ask itself must not clamp.
    let xs = em.ask(100);
    assert!(xs.iter().any(|x| x.iter().any(|&v| !(0.0..=1.0).contains(&v))));
}
