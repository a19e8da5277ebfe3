// This file is part of the shakmaty-tbprobe library.
// Copyright (C) 2026 The shakmaty-tbprobe developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::{
    cmp::max,
    fmt,
    sync::{Mutex, PoisonError},
};

use shakmaty::{Move, MoveList, Position, Role};
use tracing::{info, warn};

use crate::{
    cache::{DtzCache, TableCache},
    config::ProbeConfig,
    errors::{ProbeError, ProbeResultExt as _, SyzygyError, SyzygyResult},
    material::{self, Material, MaterialKey},
    table::{DtzLookup, TableEntry, TableLoader},
    types::{Dtz, Metric, Probe, ProbeState, Wdl, MAX_PIECES},
};

/// A collection of tables.
///
/// WDL tables are discovered when the tablebase is created and loaded
/// lazily on first use. Up to [`DTZ_ENTRIES`](crate::DTZ_ENTRIES) DTZ
/// tables are kept loaded at a time.
pub struct Tablebase<L: TableLoader> {
    loader: L,
    config: ProbeConfig,
    wdl: TableCache<L::Data>,
    dtz: Mutex<DtzCache<TableEntry<L::Data>>>,
    max_cardinality: usize,
}

impl<L: TableLoader> fmt::Debug for Tablebase<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tablebase")
            .field("config", &self.config)
            .field("wdl", &self.wdl)
            .field("max_cardinality", &self.max_cardinality)
            .finish_non_exhaustive()
    }
}

fn missing_table(metric: Metric, pos: &impl Position) -> SyzygyError {
    SyzygyError::MissingTable {
        metric,
        material: Material::from_board(pos.board()).into_normalized(),
    }
}

/// Adds underpromotion captures for all queen promotion captures in
/// `moves` that are not already in the list.
fn add_underpromotion_captures(moves: &mut MoveList) {
    for i in 0..moves.len() {
        if let Move::Normal {
            role,
            from,
            capture: Some(capture),
            to,
            promotion: Some(Role::Queen),
        } = moves[i]
        {
            for promotion in [Role::Rook, Role::Bishop, Role::Knight] {
                let m = Move::Normal {
                    role,
                    from,
                    capture: Some(capture),
                    to,
                    promotion: Some(promotion),
                };
                if !moves.contains(&m) && moves.try_push(m).is_err() {
                    return;
                }
            }
        }
    }
}

impl<L: TableLoader> Tablebase<L> {
    /// Creates a tablebase with all WDL tables that `loader` has available.
    pub fn new(loader: L) -> Tablebase<L> {
        Tablebase::with_config(loader, ProbeConfig::default())
    }

    /// Creates a tablebase with all WDL tables that `loader` has available,
    /// up to `config.max_pieces` pieces.
    pub fn with_config(loader: L, config: ProbeConfig) -> Tablebase<L> {
        let mut wdl = TableCache::new();
        let mut max_cardinality = 0;

        for material in material::enumerate(config.max_pieces.min(MAX_PIECES)) {
            if loader.exists(&material, Metric::Wdl) {
                let count = material.count();
                if wdl.insert(material) {
                    max_cardinality = max(max_cardinality, count);
                }
            }
        }

        info!(tables = wdl.len(), max_cardinality, "found tablebases");

        Tablebase {
            loader,
            config,
            wdl,
            dtz: Mutex::new(DtzCache::new()),
            max_cardinality,
        }
    }

    /// Maximum number of pieces of any available table.
    pub fn max_cardinality(&self) -> usize {
        self.max_cardinality
    }

    /// Number of available WDL tables.
    pub fn num_tables(&self) -> usize {
        self.wdl.len()
    }

    /// Available WDL tables.
    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.wdl.materials()
    }

    /// Probe limits and score scale.
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// The source of tables.
    pub fn loader(&self) -> &L {
        &self.loader
    }

    fn check_supported<S: Position>(&self, pos: &S) -> SyzygyResult<()> {
        if pos.board().occupied().count() > self.max_cardinality {
            return Err(SyzygyError::TooManyPieces);
        }
        if pos.castles().any() {
            return Err(SyzygyError::Castling);
        }
        Ok(())
    }

    /// Probe tables for the [`Wdl`] value of a position.
    ///
    /// This indicates if the position is winning, lost or drawn with
    /// or without the 50-move rule. The [`ProbeState`](crate::ProbeState)
    /// tells if the best move is a capture.
    ///
    /// # Errors
    ///
    /// See [`SyzygyError`] for possible error conditions.
    pub fn probe_wdl<S: Position + Clone>(&self, pos: &S) -> SyzygyResult<Probe<Wdl>> {
        self.check_supported(pos)?;
        self.wdl(pos)
    }

    /// Probe tables for the [`Dtz`] value of a position.
    ///
    /// Min-maxing the DTZ of the available moves guarantees achieving the
    /// optimal outcome under the 50-move rule. The value may be off by one
    /// ply if the distance was stored in moves rather than plies.
    ///
    /// # Errors
    ///
    /// See [`SyzygyError`] for possible error conditions.
    pub fn probe_dtz<S: Position + Clone>(&self, pos: &S) -> SyzygyResult<Dtz> {
        self.check_supported(pos)?;
        self.dtz(pos)
    }

    fn probe_wdl_table<S: Position>(&self, pos: &S) -> SyzygyResult<Wdl> {
        let board = pos.board();

        // Bare kings.
        if board.kings() == board.occupied() {
            return Ok(Wdl::Draw);
        }

        let key = MaterialKey::from_board(board, false);
        let table = self
            .wdl
            .get(key, &self.loader)?
            .ok_or_else(|| missing_table(Metric::Wdl, pos))?;
        table.probe_wdl(pos, key).ctx(Metric::Wdl, table.material())
    }

    fn probe_dtz_table<S: Position>(&self, pos: &S, wdl: Wdl) -> SyzygyResult<DtzLookup> {
        let key = MaterialKey::from_board(pos.board(), false);

        let mut cache = self.dtz.lock().unwrap_or_else(PoisonError::into_inner);

        if !cache.promote(key) {
            let cell = self.wdl.find(key).ok_or_else(|| missing_table(Metric::Dtz, pos))?;
            let material = cell.material().clone();

            let (entry, error) = if self.loader.exists(&material, Metric::Dtz) {
                match self.loader.load(&material, Metric::Dtz) {
                    Ok(entry) => (Some(entry), None),
                    Err(error) => {
                        warn!(%material, %error, "failed to load dtz table");
                        (None, Some(error))
                    }
                }
            } else {
                (None, None)
            };

            cache.insert(cell.key(), cell.key().mirrored(), entry);

            if let Some(error) = error {
                return Err(error).ctx(Metric::Dtz, &material);
            }
        }

        let table = cache.front().ok_or_else(|| missing_table(Metric::Dtz, pos))?;
        table.probe_dtz(pos, key, wdl).ctx(Metric::Dtz, table.material())
    }

    /// Legal captures, including all underpromotions.
    fn captures<S: Position>(pos: &S) -> MoveList {
        let mut moves = pos.capture_moves();
        add_underpromotion_captures(&mut moves);
        moves
    }

    /// Fail-soft alpha-beta search over captures, resolved with WDL tables.
    fn probe_ab<S: Position + Clone>(&self, pos: &S, mut alpha: Wdl, beta: Wdl) -> SyzygyResult<Wdl> {
        for m in &Self::captures(pos) {
            let mut after = pos.clone();
            after.play_unchecked(m);

            let v = -self.probe_ab(&after, -beta, -alpha)?;
            if v > alpha {
                if v >= beta {
                    return Ok(v);
                }
                alpha = v;
            }
        }

        let v = self.probe_wdl_table(pos)?;
        Ok(max(alpha, v))
    }

    pub(crate) fn wdl<S: Position + Clone>(&self, pos: &S) -> SyzygyResult<Probe<Wdl>> {
        // Generate (at least) all legal captures including (under)promotions.
        // Captures en passant are tracked separately: a position with an en
        // passant capture can not be in the tables.
        let captures = Self::captures(pos);
        let mut best_cap: Option<Wdl> = None;
        let mut best_ep: Option<Wdl> = None;

        for m in &captures {
            let mut after = pos.clone();
            after.play_unchecked(m);

            let v = -self.probe_ab(&after, Wdl::Loss, best_cap.map_or(Wdl::Win, |best| -best))?;
            if Some(v) > best_cap {
                if v == Wdl::Win {
                    return Ok(Probe::zeroing(v));
                }
                if !m.is_en_passant() {
                    best_cap = Some(v);
                } else if Some(v) > best_ep {
                    best_ep = Some(v);
                }
            }
        }

        let v = self.probe_wdl_table(pos)?;

        // Now max(v, best_cap) is the WDL value of the position without en
        // passant rights. The table value v does not take en passant into
        // account.
        if let Some(ep) = best_ep {
            if Some(ep) > best_cap {
                if ep > v {
                    // En passant capture is the best move.
                    return Ok(Probe::zeroing(ep));
                }
                best_cap = Some(ep);
            }
        }

        if let Some(cap) = best_cap {
            if cap >= v {
                return Ok(if cap > Wdl::Draw {
                    Probe::zeroing(cap)
                } else {
                    Probe::normal(cap)
                });
            }
        }

        // Forced en passant in an otherwise stalemated position.
        if let Some(ep) = best_ep {
            if v == Wdl::Draw
                && !captures.iter().any(|m| !m.is_en_passant())
                && !pos.legal_moves().iter().any(|m| !m.is_en_passant())
            {
                return Ok(Probe::zeroing(ep));
            }
        }

        Ok(Probe::normal(v))
    }

    pub(crate) fn dtz<S: Position + Clone>(&self, pos: &S) -> SyzygyResult<Dtz> {
        let Probe { value: wdl, state } = self.wdl(pos)?;

        if wdl == Wdl::Draw {
            return Ok(Dtz(0));
        }

        // Best move is a capture or en passant capture.
        if state == ProbeState::ZeroingBestMove {
            return Ok(Dtz::before_zeroing(wdl));
        }

        let moves = pos.legal_moves();

        // A winning pawn move that keeps the win is zeroing.
        if wdl > Wdl::Draw {
            for m in moves.iter().filter(|m| m.role() == Role::Pawn && !m.is_capture()) {
                let mut after = pos.clone();
                after.play_unchecked(m);
                if -self.wdl(&after)?.value == wdl {
                    return Ok(Dtz::before_zeroing(wdl));
                }
            }
        }

        match self.probe_dtz_table(pos, wdl)? {
            DtzLookup::Found(plies) => return Ok(Dtz::before_zeroing(wdl).add_plies(plies)),
            DtzLookup::OtherSide => {}
        }

        // The table stores the other side to move. Do a 1-ply search over
        // moves that do not zero the 50-move counter.
        if wdl > Wdl::Draw {
            let mut best: Option<Dtz> = None;
            for m in moves.iter().filter(|m| !m.is_zeroing()) {
                let mut after = pos.clone();
                after.play_unchecked(m);
                let v = -self.dtz(&after)?;
                if v.0 > 0 && best.map_or(true, |best| v.0 + 1 < best.0) {
                    best = Some(Dtz(v.0 + 1));
                }
            }
            best.ok_or(ProbeError::corrupted())
                .ctx(Metric::Dtz, &Material::from_board(pos.board()).into_normalized())
        } else {
            let mut best = Dtz::before_zeroing(wdl);
            for m in moves.iter().filter(|m| !m.is_zeroing()) {
                let mut after = pos.clone();
                after.play_unchecked(m);
                let v = -self.dtz(&after)?;
                if v.0 - 1 < best.0 {
                    best = Dtz(v.0 - 1);
                }
            }
            Ok(best)
        }
    }
}
