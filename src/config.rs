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

use crate::types::{Dtz, Wdl, MAX_PIECES};

/// Probe limits and the engine score scale used when filtering root moves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ProbeConfig {
    /// Do not probe positions with more pieces, even if tables are
    /// available. Values above 7 have no effect.
    ///
    /// Defaults to `7`.
    pub max_pieces: usize,
    /// Score of a won root position. Should be a mate-like score that is
    /// still below any real mate score.
    ///
    /// Defaults to `32000 - 128 - 1`.
    pub win_score: i32,
    /// Score of a root position that is won, but drawn by the 50-move rule.
    ///
    /// Defaults to `2`.
    pub cursed_win_score: i32,
    /// Endgame value of a pawn. Cursed wins and blessed losses that can
    /// still be converted in time are scaled to a fraction of it.
    ///
    /// Defaults to `258`.
    pub pawn_value: i32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_pieces: MAX_PIECES,
            win_score: 32000 - 128 - 1,
            cursed_win_score: 2,
            pawn_value: 258,
        }
    }
}

impl ProbeConfig {
    pub fn wdl_score(&self, wdl: Wdl) -> i32 {
        match wdl {
            Wdl::Loss => -self.win_score,
            Wdl::BlessedLoss => -self.cursed_win_score,
            Wdl::Draw => 0,
            Wdl::CursedWin => self.cursed_win_score,
            Wdl::Win => self.win_score,
        }
    }

    /// Score of a root position given its distance to zeroing and the
    /// current 50-move counter.
    ///
    /// Returns the [`Wdl`] value taking the counter into account, and the
    /// score.
    pub fn root_score(&self, dtz: Dtz, halfmoves: i32) -> (Wdl, i32) {
        let dtz = i32::from(dtz);
        let wdl = if dtz > 0 {
            if dtz + halfmoves <= 100 {
                Wdl::Win
            } else {
                Wdl::CursedWin
            }
        } else if dtz < 0 {
            if -dtz + halfmoves <= 100 {
                Wdl::Loss
            } else {
                Wdl::BlessedLoss
            }
        } else {
            Wdl::Draw
        };

        // Interpolate between draw and pawn up if the win could still be
        // converted with some luck.
        let score = match wdl {
            Wdl::CursedWin if dtz <= 100 => ((200 - dtz - halfmoves) * self.pawn_value) / 200,
            Wdl::BlessedLoss if dtz >= -100 => -((200 + dtz - halfmoves) * self.pawn_value) / 200,
            _ => self.wdl_score(wdl),
        };

        (wdl, score)
    }
}
