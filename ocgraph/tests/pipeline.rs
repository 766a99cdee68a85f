use approx::assert_abs_diff_eq;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use occore::clustering::get_clustering;
use occore::loss::{calc_lv_lbeta, calc_simple_clus_space_loss, CondensationConfig, SimpleClusSpaceConfig};
use ocgraph::io::{load_graphs, load_tables, save_graphs, save_tables};
use ocgraph::label::MIN_HITS_PER_PARTICLE;
use ocgraph::table::{HIT_TYPE_COL, PARTICLE_ENERGY_ROW, ROW_LINK};
use ocgraph::{create_graph_tracking_cld, BuiltGraph, EventTable, GraphBatch, GraphOptions};

/// Random event: particle ids are sparse, some particles leave too few hits.
fn random_table(rng: &mut StdRng) -> EventTable {
    let n_particles = rng.gen_range(3..9);
    let ids: Vec<i64> = (0..n_particles).map(|p| (p * 3) as i64).collect();
    let width = (n_particles * 3) as usize;

    let mut links = Vec::new();
    for &id in &ids {
        let n = rng.gen_range(1..9);
        links.extend(std::iter::repeat(id).take(n));
    }
    links.extend(std::iter::repeat(-1).take(rng.gen_range(0..5)));

    let n = links.len();
    let mut feats = Array2::<f32>::zeros((5, n));
    let mut vo = Array2::<i64>::from_elem((4, n), -1);
    for (i, &l) in links.iter().enumerate() {
        for d in 0..3 {
            feats[(d, i)] = rng.gen_range(-1.0..1.0);
        }
        feats[(HIT_TYPE_COL, i)] = rng.gen_range(0..4) as f32;
        vo[(ROW_LINK, i)] = l;
    }
    let mut particles = Array2::<f32>::zeros((7, width));
    for p in 0..width {
        particles[(PARTICLE_ENERGY_ROW, p)] = rng.gen_range(-0.5..10.0);
    }
    EventTable::from_columns(feats.view(), vo.view(), particles.view()).unwrap()
}

#[test]
fn graphs_never_keep_small_or_invalid_particles() {
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..200 {
        let table = random_table(&mut rng);
        let Some(graph) = create_graph_tracking_cld(&table, &GraphOptions::default())
            .unwrap()
            .into_graph()
        else {
            continue;
        };
        let counts = ocgraph::label::get_number_hits(&graph.cluster_id, graph.n_particles()).unwrap();
        assert!(counts.iter().all(|&c| c >= MIN_HITS_PER_PARTICLE));
        assert!(graph.particles.column(PARTICLE_ENERGY_ROW).iter().all(|&e| e >= 0.0));
        assert!(graph.n_particles() >= 4);
        assert_eq!(graph.n_nodes(), table.n_hits());
    }
}

#[test]
fn table_to_loss_and_decoding() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = StdRng::seed_from_u64(99);
    let mut graphs = Vec::new();
    while graphs.len() < 3 {
        if let BuiltGraph::Graph(g) = create_graph_tracking_cld(&random_table(&mut rng), &GraphOptions::default()).unwrap()
        {
            graphs.push(g);
        }
    }

    let batch = GraphBatch::from_graphs(&graphs).unwrap();
    assert_eq!(batch.n_events(), 3);

    // a model that puts every hit exactly onto its truth particle
    let n = batch.n_hits();
    let mut coords = Array2::<f32>::zeros((n, 2));
    let mut beta = vec![0.01f32; n];
    let mut seen = std::collections::HashSet::new();
    for i in 0..n {
        let (e, c) = (batch.batch()[i], batch.cluster_ids()[i]);
        if c == 0 {
            coords[(i, 0)] = 1000.0 + i as f32 * 50.0;
            continue;
        }
        coords[(i, 0)] = (e * 100 + c * 10) as f32;
        if seen.insert((e, c)) {
            beta[i] = 0.99;
        }
    }

    let input = batch.condensation_input(&beta, coords.view(), None);
    let cfg = CondensationConfig {
        trace_components: true,
        ..CondensationConfig::default()
    };
    let loss = calc_lv_lbeta(&input, &cfg).unwrap();

    // same betas, hits scattered around the origin: attraction drops, repulsion grows
    let scattered = Array2::from_shape_fn((n, 2), |_| rng.gen_range(-0.5f32..0.5));
    let scattered_input = batch.condensation_input(&beta, scattered.view(), None);
    let scattered_loss = calc_lv_lbeta(&scattered_input, &cfg).unwrap();
    assert!(loss.l_v < scattered_loss.l_v);
    assert_abs_diff_eq!(loss.l_beta, scattered_loss.l_beta);
    assert!(loss.l_beta_sig < 1.0);
    assert_eq!(loss.batch_size, 3);
    assert!(loss.l_energy.is_none());

    let simple =
        calc_simple_clus_space_loss(coords.view(), batch.cluster_ids(), batch.batch(), &SimpleClusSpaceConfig::default(), None)
            .unwrap();
    assert!(simple.l_repulsive < 1e-6);

    // every object collapses to one point: the decoder recovers the truth partition
    let betas = ndarray::Array1::from(beta.clone());
    let labels = get_clustering(betas.view(), coords.view(), 0.1, 1.0).unwrap();
    for i in 0..n {
        if batch.cluster_ids()[i] == 0 {
            assert_eq!(labels[i], -1);
        } else {
            let cp = labels[i] as usize;
            assert_eq!(batch.cluster_ids()[cp], batch.cluster_ids()[i]);
            assert_eq!(batch.batch()[cp], batch.batch()[i]);
        }
    }
}

#[test]
fn files_round_trip_through_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let tables: Vec<EventTable> = (0..20).map(|_| random_table(&mut rng)).collect();

    let table_path = dir.path().join("tables.bin");
    save_tables(&table_path, &tables, true).unwrap();
    let tables = load_tables(&table_path).unwrap();
    assert_eq!(tables.len(), 20);

    let graphs: Vec<_> = tables
        .iter()
        .filter_map(|t| create_graph_tracking_cld(t, &GraphOptions::default()).unwrap().into_graph())
        .collect();
    let graph_path = dir.path().join("graphs.json");
    save_graphs(&graph_path, &graphs, false).unwrap();
    let loaded = load_graphs(&graph_path).unwrap();
    assert_eq!(loaded.len(), graphs.len());
    for (a, b) in loaded.iter().zip(&graphs) {
        assert_eq!(a.cluster_id, b.cluster_id);
        for (x, y) in a.positions.iter().zip(b.positions.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
        }
    }
}

#[test]
fn zero_energy_particle_survives_the_energy_term() {
    let n = 16;
    let mut feats = Array2::<f32>::zeros((5, n));
    let mut vo = Array2::<i64>::from_elem((4, n), -1);
    for i in 0..n {
        feats[(0, i)] = i as f32;
        vo[(ROW_LINK, i)] = (i / 4) as i64;
    }
    let mut particles = Array2::<f32>::zeros((7, 4));
    for (p, e) in [0.0f32, 5.0, 5.0, 5.0].into_iter().enumerate() {
        particles[(PARTICLE_ENERGY_ROW, p)] = e;
    }
    let table = EventTable::from_columns(feats.view(), vo.view(), particles.view()).unwrap();

    let graph = create_graph_tracking_cld(&table, &GraphOptions::default())
        .unwrap()
        .into_graph()
        .unwrap();
    assert_eq!(graph.n_particles(), 4);

    let batch = GraphBatch::from_graphs(&[graph]).unwrap();
    assert_eq!(batch.true_energy()[0], 0.0);
    let beta = vec![0.5f32; n];
    let hit_energy = vec![1.25f32; n];
    let coords = batch.coords().unwrap();
    let input = batch.condensation_input(&beta, coords, Some(hit_energy.as_slice()));
    let loss = calc_lv_lbeta(&input, &CondensationConfig::default()).unwrap();

    // every object predicts 5: the zero-energy one costs 25, the others nothing
    assert_abs_diff_eq!(loss.l_energy.unwrap(), 25.0 / 4.0, epsilon = 1e-4);
}
