use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use shakmaty::{fen::Fen, zobrist::Zobrist64, CastlingMode, Chess, Color, Role, Square};
use shakmaty_tbprobe::{
    root_moves, Dtz, Material, MemoryData, MemoryLoader, Metric, Probe, ProbeResult, ProbeState, RootMove,
    SyzygyError, TableEntry, TableLoader, Tablebase, Wdl,
};

fn position(fen: &str) -> Chess {
    fen.parse::<Fen>()
        .expect("valid fen")
        .into_position(CastlingMode::Standard)
        .expect("legal position")
}

fn white_wins(stm: Color, _squares: &[Square]) -> Wdl {
    if stm == Color::White {
        Wdl::Win
    } else {
        Wdl::Loss
    }
}

/// KRvK where white always wins in 10 plies.
fn krk_loader() -> MemoryLoader {
    let mut loader = MemoryLoader::new();
    loader
        .add_wdl("KRvK", white_wins)
        .expect("valid material")
        .add_dtz("KRvK", Color::White, |_| 10)
        .expect("valid material");
    loader
}

#[derive(Debug, Default)]
struct CountingLoader {
    inner: MemoryLoader,
    wdl_loads: AtomicUsize,
    dtz_loads: AtomicUsize,
}

impl CountingLoader {
    fn new(inner: MemoryLoader) -> CountingLoader {
        CountingLoader {
            inner,
            ..CountingLoader::default()
        }
    }

    fn loads(&self, metric: Metric) -> usize {
        match metric {
            Metric::Wdl => self.wdl_loads.load(Ordering::SeqCst),
            Metric::Dtz => self.dtz_loads.load(Ordering::SeqCst),
        }
    }
}

impl TableLoader for CountingLoader {
    type Data = MemoryData;

    fn exists(&self, material: &Material, metric: Metric) -> bool {
        self.inner.exists(material, metric)
    }

    fn load(&self, material: &Material, metric: Metric) -> ProbeResult<TableEntry<MemoryData>> {
        match metric {
            Metric::Wdl => &self.wdl_loads,
            Metric::Dtz => &self.dtz_loads,
        }
        .fetch_add(1, Ordering::SeqCst);
        self.inner.load(material, metric)
    }
}

fn is_move(rm: &RootMove, role: Role, to: Square) -> bool {
    rm.m.role() == role && rm.m.to() == to
}

#[test]
fn test_mate_is_kept_after_repetition() {
    let tables = Tablebase::new(krk_loader());
    let pos = position("k7/8/1K6/8/8/8/8/7R w - - 0 1");

    assert_eq!(tables.probe_dtz(&pos).expect("probe dtz"), Dtz(11));

    let mut moves = root_moves(&pos);
    assert_eq!(moves.len(), 20);

    let history = [Zobrist64(1), Zobrist64(2), Zobrist64(3), Zobrist64(4), Zobrist64(1)];
    let score = tables.root_probe_dtz(&pos, &history, &mut moves).expect("root probe");
    assert_eq!(score, tables.config().win_score);
    assert_eq!(moves.len(), 1);
    assert!(is_move(&moves[0], Role::Rook, Square::H8));
    assert_eq!(moves[0].value, 1);
}

#[test]
fn test_mate_is_kept_near_50_move_rule() {
    let tables = Tablebase::new(krk_loader());
    let pos = position("k7/8/1K6/8/8/8/8/7R w - - 98 80");

    let mut moves = root_moves(&pos);
    let score = tables
        .root_probe_dtz::<_, Zobrist64>(&pos, &[], &mut moves)
        .expect("root probe");
    assert_eq!(score, (200 - 11 - 98) * 258 / 200);
    assert_eq!(moves.len(), 1);
    assert!(is_move(&moves[0], Role::Rook, Square::H8));
}

#[test]
fn test_all_winning_moves_are_kept() {
    let tables = Tablebase::new(krk_loader());
    let pos = position("k7/8/1K6/8/8/8/8/7R w - - 0 1");

    let mut moves = root_moves(&pos);
    tables
        .root_probe_dtz::<_, Zobrist64>(&pos, &[], &mut moves)
        .expect("root probe");
    assert_eq!(moves.len(), 20);

    // Mate first, all others convert through the table.
    let value = |role, to| {
        moves
            .iter()
            .find(|rm| is_move(rm, role, to))
            .map(|rm| rm.value)
    };
    assert_eq!(value(Role::Rook, Square::H8), Some(1));
    assert_eq!(value(Role::Rook, Square::B1), Some(13));
    assert_eq!(value(Role::Rook, Square::H2), Some(13));
    assert_eq!(value(Role::King, Square::C6), Some(13));
}

#[test]
fn test_missing_table() {
    let tables = Tablebase::new(krk_loader());
    let pos = position("8/4P3/8/8/8/8/k7/4K3 w - - 0 1");

    match tables.probe_wdl(&pos) {
        Err(SyzygyError::MissingTable { metric, material }) => {
            assert_eq!(metric, Metric::Wdl);
            assert_eq!(material.to_string(), "KPvK");
        }
        res => panic!("unexpected result: {res:?}"),
    }
    assert!(tables.probe_dtz(&pos).is_err());

    let mut moves = root_moves(&pos);
    let before = moves.clone();
    assert!(tables.root_probe_dtz::<_, Zobrist64>(&pos, &[], &mut moves).is_err());
    assert_eq!(moves, before);
    assert!(tables.root_probe_wdl(&pos, &mut moves).is_err());
    assert_eq!(moves, before);
    assert!(tables.filter_root_moves::<_, Zobrist64>(&pos, &[], &mut moves).is_err());
    assert_eq!(moves, before);
}

#[test]
fn test_drawing_capture() {
    let tables = Tablebase::new(krk_loader());
    let pos = position("8/8/8/3k4/2R5/8/8/7K b - - 0 1");

    assert_eq!(
        tables.probe_wdl(&pos).expect("probe wdl"),
        Probe {
            value: Wdl::Draw,
            state: ProbeState::Normal,
        }
    );
    assert_eq!(tables.probe_dtz(&pos).expect("probe dtz"), Dtz(0));

    let mut moves = root_moves(&pos);
    assert_eq!(moves.len(), 4);
    let score = tables
        .root_probe_dtz::<_, Zobrist64>(&pos, &[], &mut moves)
        .expect("root probe");
    assert_eq!(score, 0);
    assert_eq!(moves.len(), 1);
    assert!(is_move(&moves[0], Role::King, Square::C4));
}

#[test]
fn test_bare_kings() {
    let tables = Tablebase::new(krk_loader());
    let pos = position("8/8/8/4k3/8/8/8/4K3 w - - 0 1");

    assert_eq!(tables.probe_wdl(&pos).expect("probe wdl").value, Wdl::Draw);
    assert_eq!(tables.probe_dtz(&pos).expect("probe dtz"), Dtz(0));

    let mut moves = root_moves(&pos);
    let num_moves = moves.len();
    let score = tables
        .root_probe_dtz::<_, Zobrist64>(&pos, &[], &mut moves)
        .expect("root probe");
    assert_eq!(score, 0);
    assert_eq!(moves.len(), num_moves);
}

fn krk_by_rook_square() -> Tablebase<MemoryLoader> {
    let mut loader = MemoryLoader::new();
    loader
        .add_wdl("KRvK", white_wins)
        .expect("valid material")
        .add_dtz("KRvK", Color::White, |squares| match squares[1] {
            Square::H1 => 4,
            Square::H7 => 2,
            _ => 30,
        })
        .expect("valid material");
    Tablebase::new(loader)
}

#[test]
fn test_50_move_rule_keeps_fastest() {
    let tables = krk_by_rook_square();

    let pos = position("4k3/8/8/8/8/8/8/4K2R w - - 97 60");
    assert_eq!(tables.probe_dtz(&pos).expect("probe dtz"), Dtz(5));

    let mut moves = root_moves(&pos);
    assert_eq!(moves.len(), 14);
    let score = tables
        .root_probe_dtz::<_, Zobrist64>(&pos, &[], &mut moves)
        .expect("root probe");
    assert_eq!(score, (200 - 5 - 97) * 258 / 200);
    assert_eq!(moves.len(), 1);
    assert!(is_move(&moves[0], Role::Rook, Square::H7));
    assert_eq!(moves[0].value, 5);

    // Without pressure from the 50-move rule, all winning moves are fine.
    let pos = position("4k3/8/8/8/8/8/8/4K2R w - - 0 60");
    let mut moves = root_moves(&pos);
    let score = tables
        .root_probe_dtz::<_, Zobrist64>(&pos, &[], &mut moves)
        .expect("root probe");
    assert_eq!(score, tables.config().win_score);
    assert_eq!(moves.len(), 14);
    assert!(moves.iter().any(|rm| is_move(rm, Role::King, Square::D2) && rm.value == 7));
    assert!(moves.iter().any(|rm| is_move(rm, Role::Rook, Square::H8) && rm.value == 33));
}

#[test]
fn test_losing_side_keeps_all_moves() {
    let tables = Tablebase::new(krk_loader());
    let pos = position("4k3/8/8/8/8/8/8/4K2R b - - 0 1");

    let mut moves = root_moves(&pos);
    assert_eq!(moves.len(), 5);
    let score = tables
        .root_probe_dtz::<_, Zobrist64>(&pos, &[], &mut moves)
        .expect("root probe");
    assert_eq!(score, -tables.config().win_score);
    assert_eq!(moves.len(), 5);
    assert!(moves.iter().all(|rm| rm.value == -12));
}

#[test]
fn test_mirrored_positions() {
    let tables = Tablebase::new(krk_loader());

    let pos = position("k7/8/1K6/8/8/8/8/7R w - - 0 1");
    let mirrored = position("7r/8/8/8/8/1k6/8/K7 b - - 0 1");
    assert_eq!(tables.probe_wdl(&pos).expect("probe wdl"), tables.probe_wdl(&mirrored).expect("probe wdl"));
    assert_eq!(tables.probe_dtz(&pos).expect("probe dtz"), tables.probe_dtz(&mirrored).expect("probe dtz"));
}

#[test]
fn test_losing_side_resists_longest_near_50_move_rule() {
    let mut loader = MemoryLoader::new();
    loader
        .add_wdl("KRvK", white_wins)
        .expect("valid material")
        .add_dtz("KRvK", Color::White, |squares| match squares[2] {
            Square::D8 => 40,
            Square::D7 => 20,
            _ => 10,
        })
        .expect("valid material");
    let tables = Tablebase::new(loader);
    let pos = position("4k3/8/8/8/8/8/8/4K2R b - - 90 60");

    assert_eq!(tables.probe_dtz(&pos).expect("probe dtz"), Dtz(-42));

    let mut moves = root_moves(&pos);
    assert_eq!(moves.len(), 5);
    let score = tables
        .root_probe_dtz::<_, Zobrist64>(&pos, &[], &mut moves)
        .expect("root probe");
    assert_eq!(score, -(200 - 42 - 90) * 258 / 200);
    assert_eq!(score, -87);
    assert_eq!(moves.len(), 1);
    assert!(is_move(&moves[0], Role::King, Square::D8));
    assert_eq!(moves[0].value, -42);
}

#[test]
fn test_winning_side_not_stored() {
    let mut loader = MemoryLoader::new();
    loader
        .add_wdl("KRvK", white_wins)
        .expect("valid material")
        .add_dtz("KRvK", Color::Black, |_| 10)
        .expect("valid material");
    let tables = Tablebase::new(loader);

    // Black to move is read from the table.
    let pos = position("k7/8/1K6/8/8/8/8/7R b - - 0 1");
    assert_eq!(tables.probe_dtz(&pos).expect("probe dtz"), Dtz(-11));

    // White to move takes the fastest reply, one ply further.
    let pos = position("k7/8/1K6/8/8/8/8/7R w - - 0 1");
    assert_eq!(tables.probe_dtz(&pos).expect("probe dtz"), Dtz(12));
}

#[test]
fn test_wdl_filter_keeps_best_moves() {
    let mut loader = MemoryLoader::new();
    loader.add_wdl("KRvK", white_wins).expect("valid material");
    let tables = Tablebase::new(loader);
    let pos = position("8/8/8/3k4/2R5/8/8/7K b - - 0 1");

    let mut moves = root_moves(&pos);
    assert_eq!(moves.len(), 4);
    let score = tables.root_probe_wdl(&pos, &mut moves).expect("root probe");
    assert_eq!(score, 0);
    assert_eq!(moves.len(), 1);
    assert!(is_move(&moves[0], Role::King, Square::C4));
    assert_eq!(moves[0].value, 0);

    let mut moves = root_moves(&pos);
    let score = tables
        .filter_root_moves::<_, Zobrist64>(&pos, &[], &mut moves)
        .expect("filter");
    assert_eq!(score, 0);
    assert_eq!(moves.len(), 1);
    assert!(is_move(&moves[0], Role::King, Square::C4));
}

#[test]
fn test_dtz_falls_back_to_wdl() {
    let mut loader = MemoryLoader::new();
    loader.add_wdl("KRvK", white_wins).expect("valid material");
    let tables = Tablebase::new(loader);
    let pos = position("k7/8/1K6/8/8/8/8/7R w - - 0 1");

    let mut moves = root_moves(&pos);
    match tables.root_probe_dtz::<_, Zobrist64>(&pos, &[], &mut moves) {
        Err(SyzygyError::MissingTable { metric, .. }) => assert_eq!(metric, Metric::Dtz),
        res => panic!("unexpected result: {res:?}"),
    }
    assert!(moves.iter().all(|rm| rm.value == 0));

    let score = tables
        .filter_root_moves::<_, Zobrist64>(&pos, &[], &mut moves)
        .expect("filter");
    assert_eq!(score, tables.config().win_score);
    assert_eq!(moves.len(), 20);
    assert!(moves.iter().all(|rm| rm.value == i32::from(Wdl::Win)));
}

#[test]
fn test_winning_capture() {
    let mut loader = krk_loader();
    loader.add_wdl("KRvKN", |_, _| Wdl::Draw).expect("valid material");
    let tables = Tablebase::new(loader);
    let pos = position("7k/8/8/3n4/8/8/8/K2R4 w - - 0 1");

    assert_eq!(
        tables.probe_wdl(&pos).expect("probe wdl"),
        Probe {
            value: Wdl::Win,
            state: ProbeState::ZeroingBestMove,
        }
    );
    assert_eq!(tables.probe_dtz(&pos).expect("probe dtz"), Dtz(1));
}

#[test]
fn test_en_passant_is_best() {
    let mut loader = MemoryLoader::new();
    loader
        .add_wdl("KPvKP", |_, _| Wdl::Draw)
        .expect("valid material")
        .add_wdl("KPvK", |stm, _| {
            if stm == Color::White {
                Wdl::CursedWin
            } else {
                Wdl::BlessedLoss
            }
        })
        .expect("valid material");
    let tables = Tablebase::new(loader);
    let pos = position("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2");

    assert_eq!(
        tables.probe_wdl(&pos).expect("probe wdl"),
        Probe {
            value: Wdl::CursedWin,
            state: ProbeState::ZeroingBestMove,
        }
    );
    assert_eq!(tables.probe_dtz(&pos).expect("probe dtz"), Dtz(101));
}

fn ep_stalemate_tables() -> Tablebase<MemoryLoader> {
    let mut loader = MemoryLoader::new();
    loader
        .add_wdl("KPPvKPP", |_, _| Wdl::Draw)
        .expect("valid material")
        .add_wdl("KPPvKP", |stm, _| {
            if stm == Color::Black {
                Wdl::Win
            } else {
                Wdl::Loss
            }
        })
        .expect("valid material");
    Tablebase::new(loader)
}

#[test]
fn test_forced_en_passant() {
    let tables = ep_stalemate_tables();

    // The only legal move is a losing en passant capture.
    let pos = position("K7/P1k5/4p3/4Pp2/8/8/8/8 w - f6 0 2");
    assert_eq!(
        tables.probe_wdl(&pos).expect("probe wdl"),
        Probe {
            value: Wdl::Loss,
            state: ProbeState::ZeroingBestMove,
        }
    );
    assert_eq!(tables.probe_dtz(&pos).expect("probe dtz"), Dtz(-1));

    // The king can move instead.
    let pos = position("K7/P2k4/4p3/4Pp2/8/8/8/8 w - f6 0 2");
    assert_eq!(
        tables.probe_wdl(&pos).expect("probe wdl"),
        Probe {
            value: Wdl::Draw,
            state: ProbeState::Normal,
        }
    );
}

#[test]
fn test_tables_load_once() {
    let tables = Tablebase::new(CountingLoader::new(krk_loader()));
    let pos = position("k7/8/1K6/8/8/8/8/7R w - - 0 1");

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..10 {
                    assert_eq!(tables.probe_dtz(&pos).expect("probe dtz"), Dtz(11));
                }
            });
        }
    });

    assert_eq!(tables.loader().loads(Metric::Wdl), 1);
    assert_eq!(tables.loader().loads(Metric::Dtz), 1);
}

#[test]
fn test_failed_load_is_remembered() {
    let mut loader = MemoryLoader::new();
    loader.add_corrupted("KRvK", Metric::Wdl).expect("valid material");
    let tables = Tablebase::new(CountingLoader::new(loader));
    let pos = position("k7/8/1K6/8/8/8/8/7R w - - 0 1");

    match tables.probe_wdl(&pos) {
        Err(SyzygyError::ProbeFailed { metric, material, .. }) => {
            assert_eq!(metric, Metric::Wdl);
            assert_eq!(material.to_string(), "KRvK");
        }
        res => panic!("unexpected result: {res:?}"),
    }
    assert!(matches!(tables.probe_wdl(&pos), Err(SyzygyError::MissingTable { .. })));
    assert_eq!(tables.loader().loads(Metric::Wdl), 1);
}

#[test]
fn test_failed_dtz_load_is_remembered() {
    let mut loader = MemoryLoader::new();
    loader
        .add_wdl("KRvK", white_wins)
        .expect("valid material")
        .add_corrupted("KRvK", Metric::Dtz)
        .expect("valid material");
    let tables = Tablebase::new(CountingLoader::new(loader));
    let pos = position("k7/8/1K6/8/8/8/8/7R w - - 0 1");

    assert!(matches!(tables.probe_dtz(&pos), Err(SyzygyError::ProbeFailed { .. })));
    assert!(matches!(tables.probe_dtz(&pos), Err(SyzygyError::MissingTable { .. })));
    assert_eq!(tables.loader().loads(Metric::Dtz), 1);
    assert_eq!(tables.probe_wdl(&pos).expect("probe wdl").value, Wdl::Win);
}

#[test]
fn test_dtz_tables_are_evicted() {
    let mut loader = MemoryLoader::new();
    let names = ["KQvK", "KRvK", "KQQvK", "KRRvK", "KQRvK"];
    for name in names {
        loader
            .add_wdl(name, white_wins)
            .expect("valid material")
            .add_dtz(name, Color::White, |_| 10)
            .expect("valid material");
    }
    let tables = Tablebase::new(CountingLoader::new(loader));

    let positions = [
        "7k/8/8/8/8/1Q6/8/K7 w - - 0 1",
        "7k/8/8/8/8/8/2R5/K7 w - - 0 1",
        "7k/8/8/8/8/1Q6/8/K2Q4 w - - 0 1",
        "7k/8/8/8/8/8/2R1R3/K7 w - - 0 1",
        "7k/8/8/8/8/1Q6/2R5/K7 w - - 0 1",
    ]
    .map(position);

    let probe = |i: usize| {
        assert_eq!(tables.probe_dtz(&positions[i]).expect("probe dtz"), Dtz(11));
    };

    for i in 0..5 {
        probe(i);
    }
    assert_eq!(tables.loader().loads(Metric::Dtz), 5);

    // Most recently used tables stay loaded.
    probe(4);
    assert_eq!(tables.loader().loads(Metric::Dtz), 5);

    // The first table was evicted.
    probe(0);
    assert_eq!(tables.loader().loads(Metric::Dtz), 6);
    probe(2);
    assert_eq!(tables.loader().loads(Metric::Dtz), 6);

    // Loading the first table evicted the least recently used one.
    probe(1);
    assert_eq!(tables.loader().loads(Metric::Dtz), 7);

    assert_eq!(tables.loader().loads(Metric::Wdl), 5);
}
