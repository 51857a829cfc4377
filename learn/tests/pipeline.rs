use std::io::Write;

use learn::{
    DesyncKind, FeaturePaths, LearnConfig, LearnError, Norm, Pipeline, Schedule,
};
use ndarray::ArrayView2;
use network::{LbfgsbOptions, Loss, Method, Network, NetworkError, Termination, TrainReport};

/// Records the shape of every training call instead of training.
#[derive(Default)]
struct Recorder {
    calls: Vec<(usize, usize, usize, usize)>,
    first_inputs: Vec<Vec<f64>>,
}

impl Network for Recorder {
    fn input_size(&self) -> usize {
        0
    }

    fn output_size(&self) -> usize {
        0
    }

    fn train(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        _method: Method,
        _loss: Loss,
        _options: &LbfgsbOptions,
    ) -> Result<TrainReport, NetworkError> {
        self.calls.push((x.nrows(), x.ncols(), y.nrows(), y.ncols()));
        self.first_inputs.push(x.row(0).to_vec());
        Ok(TrainReport {
            error: 0.0,
            iterations: 0,
            evaluations: 1,
            termination: Termination::ProjectedGradient,
        })
    }
}

/// `rows_per_song[i]` rows for song `i + 1`, constant-Q first value set to the
/// song number so batches can be traced back to songs.
fn streams(rows_per_song: &[usize]) -> (String, String) {
    let (mut chroma, mut constant_q) = (String::new(), String::new());
    for (index, &rows) in rows_per_song.iter().enumerate() {
        let song = index + 1;
        for row in 0..rows {
            let id = if row == 0 { format!("song{song}.wav") } else { String::new() };
            let ts = format!("{:.2}", row as f64 * 0.05);
            chroma.push_str(&format!("{id},{ts},{}\n", vec!["1"; 24].join(",")));
            constant_q.push_str(&format!("{id},{ts},{song},1,1\n"));
        }
    }
    (chroma, constant_q)
}

fn config() -> LearnConfig {
    LearnConfig {
        constant_q_norm: Norm::None,
        ..LearnConfig::buffered()
    }
}

#[test]
fn buffered_run_flushes_every_two_songs() {
    let (chroma, constant_q) = streams(&[2, 3, 1, 2, 4]);
    let pipeline = Pipeline::new(&config(), Schedule::Buffered { delta_train: 2 }).unwrap();
    let mut net = Recorder::default();

    let summary = pipeline
        .run(chroma.as_bytes(), constant_q.as_bytes(), &mut net)
        .unwrap();

    assert_eq!(summary.trainer_calls(), 3);
    assert_eq!(summary.songs, 5);
    assert_eq!(summary.rows, 12);
    let rows: Vec<usize> = net.calls.iter().map(|c| c.0).collect();
    // song 1 | songs 2-3 | songs 4-5
    assert_eq!(rows, vec![2, 4, 6]);
    let first_songs: Vec<f64> = net.first_inputs.iter().map(|r| r[0]).collect();
    assert_eq!(first_songs, vec![1.0, 2.0, 4.0]);
}

#[test]
fn flush_with_nothing_buffered_is_skipped() {
    let (chroma, constant_q) = streams(&[1, 1, 1]);
    let pipeline = Pipeline::new(&config(), Schedule::Buffered { delta_train: 1 }).unwrap();
    let mut net = Recorder::default();

    let summary = pipeline
        .run(chroma.as_bytes(), constant_q.as_bytes(), &mut net)
        .unwrap();

    // song 1 flushes an empty buffer, songs 2 and 3 flush their predecessor
    assert_eq!(summary.empty_flushes, 1);
    assert_eq!(summary.trainer_calls(), 3);
    assert!(net.calls.iter().all(|c| c.0 == 1));
}

#[test]
fn unbuffered_run_trains_once_on_everything() {
    let chroma = "a,0.00,1,2,3,4\n,0.05,1,1,1,1\n,0.10,0,0,0,0\n";
    let constant_q = "a,0.00,1,2,3\n,0.05,3,2,1\n,0.10,1,1,1\n";
    let config = LearnConfig {
        chroma_split: 2,
        loss: Loss::Sse,
        ..LearnConfig::unbuffered()
    };
    let pipeline = Pipeline::new(&config, Schedule::Unbuffered).unwrap();
    let mut net = Recorder::default();

    let summary = pipeline
        .run(chroma.as_bytes(), constant_q.as_bytes(), &mut net)
        .unwrap();

    assert_eq!(net.calls, vec![(3, 3, 3, 4)]);
    assert_eq!(summary.trainer_calls(), 1);
    // Linf on the constant-Q row
    assert_eq!(net.first_inputs[0], vec![1.0 / 3.0, 2.0 / 3.0, 1.0]);
}

#[test]
fn desync_at_step_five_stops_before_training() {
    let (chroma, mut constant_q) = streams(&[6]);
    constant_q = constant_q.replacen(",0.20,", ",0.21,", 1);
    let pipeline = Pipeline::new(&config(), Schedule::Unbuffered).unwrap();
    let mut net = Recorder::default();

    let err = pipeline
        .run(chroma.as_bytes(), constant_q.as_bytes(), &mut net)
        .unwrap_err();

    assert!(matches!(
        err,
        LearnError::Desync {
            step: 5,
            kind: DesyncKind::Timestamp { .. }
        }
    ));
    assert!(err.to_string().contains("timestamp mismatch"));
    assert!(net.calls.is_empty());
}

#[test]
fn walker_emits_the_rows_before_a_desync() {
    let (chroma, mut constant_q) = streams(&[6]);
    constant_q = constant_q.replacen(",0.20,", ",0.2000001,", 1);

    let results: Vec<_> = learn::SyncWalker::new(chroma.as_bytes(), constant_q.as_bytes()).collect();

    assert_eq!(results.len(), 5);
    for (index, result) in results[..4].iter().enumerate() {
        assert_eq!(result.as_ref().unwrap().index, index + 1);
    }
    assert!(matches!(results[4], Err(LearnError::Desync { step: 5, .. })));
}

#[test]
fn path_entry_point_trains_a_real_network() {
    let dir = tempfile::tempdir().unwrap();
    let chroma_path = dir.path().join("bothchroma.csv");
    let constant_q_path = dir.path().join("logfreqspec.csv");

    let mut chroma = std::fs::File::create(&chroma_path).unwrap();
    let mut constant_q = std::fs::File::create(&constant_q_path).unwrap();
    for song in 0..3 {
        for row in 0..4 {
            let id = if row == 0 { format!("song{song}") } else { String::new() };
            let ts = format!("{:.2}", row as f64 * 0.05);
            let bass: Vec<String> = (0..2).map(|i| ((song + i + row) % 3).to_string()).collect();
            let treble: Vec<String> = (0..2).map(|i| ((i + row) % 2 + 1).to_string()).collect();
            writeln!(chroma, "{id},{ts},{},{}", bass.join(","), treble.join(",")).unwrap();
            writeln!(constant_q, "{id},{ts},{},{},{}", song + 1, row + 1, 2).unwrap();
        }
    }
    drop((chroma, constant_q));

    let config = LearnConfig {
        layer_sizes: vec![3, 4, 4],
        chroma_split: 2,
        loss: Loss::KlDiv,
        ..LearnConfig::buffered()
    };
    let paths = FeaturePaths {
        chroma: chroma_path,
        constant_q: constant_q_path,
    };

    let (net, summary) = learn::learn_buffered(&paths, &config).unwrap();

    assert_eq!(summary.rows, 12);
    assert_eq!(summary.trainer_calls(), 2);
    assert_eq!(net.layer_sizes(), &[3, 4, 4]);
    assert!(summary.reports.iter().all(|r| r.error.is_finite()));
}

#[test]
fn missing_file_is_an_io_error() {
    let paths = FeaturePaths {
        chroma: "does/not/exist.csv".into(),
        constant_q: "does/not/exist_either.csv".into(),
    };
    let err = learn::learn(&paths, &LearnConfig::unbuffered()).unwrap_err();
    assert!(matches!(
        err,
        LearnError::Io {
            stream: learn::Stream::Chroma,
            ..
        }
    ));
}

#[test]
fn width_mismatch_surfaces_as_network_error() {
    let chroma = "a,0.00,1,1\n";
    let constant_q = "a,0.00,1,1\n";
    let config = LearnConfig {
        layer_sizes: vec![5, 2],
        chroma_split: 1,
        ..LearnConfig::unbuffered()
    };
    let mut net = learn::assemble_network(&config).unwrap();
    let pipeline = Pipeline::new(&config, Schedule::Unbuffered).unwrap();

    let err = pipeline
        .run(chroma.as_bytes(), constant_q.as_bytes(), &mut net)
        .unwrap_err();
    assert!(matches!(
        err,
        LearnError::Network(NetworkError::DimensionMismatch { expected: 5, actual: 2, .. })
    ));
}
