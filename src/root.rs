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

//! Filtering of root moves.
//!
//! At the root an engine can use the tables to restrict the search to moves
//! that preserve the best outcome, taking the 50-move rule into account.

use shakmaty::{Move, Position};
use tracing::debug;

use crate::{
    errors::SyzygyResult,
    table::TableLoader,
    tablebase::Tablebase,
    types::{Dtz, Wdl},
};

/// A move at the root and its value from the last filter.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct RootMove {
    pub m: Move,
    /// Signed distance for [`Tablebase::root_probe_dtz()`], or the
    /// [`Wdl`] value for [`Tablebase::root_probe_wdl()`].
    pub value: i32,
}

impl RootMove {
    pub fn new(m: Move) -> RootMove {
        RootMove { m, value: 0 }
    }
}

/// All legal moves of `pos`.
pub fn root_moves<S: Position>(pos: &S) -> Vec<RootMove> {
    pos.legal_moves().into_iter().map(RootMove::new).collect()
}

/// Checks if any position in `history` occurred before, at an even distance
/// of at least 4 plies.
///
/// `history` holds the hashes of all positions since the last zeroing move,
/// oldest first and ending with the current position.
pub fn has_repeated<H: PartialEq>(history: &[H]) -> bool {
    history.iter().enumerate().any(|(i, hash)| {
        history[..i].iter().rev().skip(3).step_by(2).any(|earlier| earlier == hash)
    })
}

impl<L: TableLoader> Tablebase<L> {
    /// Signed distance of the position after `m`, from the point of view of
    /// the side playing it.
    fn root_move_dtz<S: Position + Clone>(&self, pos: &S, m: &Move, dtz: Dtz) -> SyzygyResult<i32> {
        let mut after = pos.clone();
        after.play_unchecked(m);

        // Checkmate is not in the tables.
        if after.is_check() && dtz.0 > 0 && after.legal_moves().is_empty() {
            return Ok(1);
        }

        if after.halfmoves() != 0 {
            let v = -self.dtz(&after)?;
            Ok(v.0 + v.signum())
        } else {
            Ok(Dtz::before_zeroing(-self.wdl(&after)?.value).0)
        }
    }

    /// Uses DTZ tables to filter `root_moves`, keeping those that preserve
    /// the outcome and make progress under the 50-move rule. Returns the
    /// score of the position.
    ///
    /// If winning, moves that can still be converted in time are kept, or
    /// only the fastest if the position repeated (`history` are the hashes of
    /// the positions since the last zeroing move, ending with the current
    /// one). If losing, all moves are kept unless a 50-move rule draw is near,
    /// in which case only those resisting the longest are kept. If drawn,
    /// only drawing moves are kept.
    ///
    /// # Errors
    ///
    /// See [`SyzygyError`](crate::SyzygyError) for possible error conditions.
    /// On error `root_moves` is unchanged.
    pub fn root_probe_dtz<S, H>(&self, pos: &S, history: &[H], root_moves: &mut Vec<RootMove>) -> SyzygyResult<i32>
    where
        S: Position + Clone,
        H: PartialEq,
    {
        let dtz = self.probe_dtz(pos)?;

        let values = root_moves
            .iter()
            .map(|rm| self.root_move_dtz(pos, &rm.m, dtz))
            .collect::<SyzygyResult<Vec<_>>>()?;

        let halfmoves = i32::try_from(pos.halfmoves()).unwrap_or(i32::MAX);
        let (_, score) = self.config().root_score(dtz, halfmoves);

        for (rm, value) in root_moves.iter_mut().zip(values) {
            rm.value = value;
        }

        if dtz.0 > 0 {
            let best = root_moves
                .iter()
                .map(|rm| rm.value)
                .filter(|v| *v > 0)
                .min()
                .unwrap_or(0xffff);

            // Keep all winning moves that convert before the 50-move rule,
            // unless the position repeated. Then only the fastest.
            let max_allowed = if !has_repeated(history) && best + halfmoves <= 99 {
                99 - halfmoves
            } else {
                best
            };

            root_moves.retain(|rm| rm.value > 0 && rm.value <= max_allowed);
        } else if dtz.0 < 0 {
            let best = root_moves.iter().map(|rm| rm.value).min().unwrap_or(0).min(0);

            // Try all moves, unless a 50-move rule draw is close.
            if -best * 2 + halfmoves < 100 {
                return Ok(score);
            }

            root_moves.retain(|rm| rm.value == best);
        } else {
            root_moves.retain(|rm| rm.value == 0);
        }

        Ok(score)
    }

    /// Uses WDL tables to filter `root_moves`, keeping those with the best
    /// value. Returns the score of the position.
    ///
    /// Used when DTZ tables are missing. The engine then has to make
    /// progress by itself.
    ///
    /// # Errors
    ///
    /// See [`SyzygyError`](crate::SyzygyError) for possible error conditions.
    /// On error `root_moves` is unchanged.
    pub fn root_probe_wdl<S: Position + Clone>(&self, pos: &S, root_moves: &mut Vec<RootMove>) -> SyzygyResult<i32> {
        let wdl = self.probe_wdl(pos)?.value;

        let values = root_moves
            .iter()
            .map(|rm| {
                let mut after = pos.clone();
                after.play_unchecked(&rm.m);
                Ok(i32::from(-self.wdl(&after)?.value))
            })
            .collect::<SyzygyResult<Vec<_>>>()?;

        let mut best = i32::from(Wdl::Loss);
        for (rm, value) in root_moves.iter_mut().zip(values) {
            rm.value = value;
            best = best.max(value);
        }

        root_moves.retain(|rm| rm.value == best);

        Ok(self.config().wdl_score(wdl))
    }

    /// Filters `root_moves` with DTZ tables, or with WDL tables if that
    /// fails. Returns the score of the position.
    ///
    /// # Errors
    ///
    /// Returns the error of the WDL probe if both failed. On error
    /// `root_moves` is unchanged.
    pub fn filter_root_moves<S, H>(&self, pos: &S, history: &[H], root_moves: &mut Vec<RootMove>) -> SyzygyResult<i32>
    where
        S: Position + Clone,
        H: PartialEq,
    {
        self.root_probe_dtz(pos, history, root_moves).or_else(|error| {
            debug!(%error, "dtz root probe failed, falling back to wdl");
            self.root_probe_wdl(pos, root_moves)
        })
    }
}
