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

use std::{fmt, ops::Neg};

/// Maximum number of pieces a table can cover.
pub const MAX_PIECES: usize = 7;

/// 5-valued evaluation of a position in the context of the 50-move drawing
/// rule.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(i8)]
pub enum Wdl {
    /// Unconditional loss for the side to move.
    Loss = -2,
    /// Loss that can be saved by the 50-move rule.
    BlessedLoss = -1,
    /// Unconditional draw.
    Draw = 0,
    /// Win that can be frustrated by the 50-move rule.
    CursedWin = 1,
    /// Unconditional win.
    Win = 2,
}

impl Wdl {
    /// Decodes a raw table value in `0..=4`.
    pub fn from_raw(raw: u16) -> Option<Wdl> {
        Some(match raw {
            0 => Wdl::Loss,
            1 => Wdl::BlessedLoss,
            2 => Wdl::Draw,
            3 => Wdl::CursedWin,
            4 => Wdl::Win,
            _ => return None,
        })
    }

    /// Gets the raw table value in `0..=4`.
    pub fn to_raw(self) -> u16 {
        (i8::from(self) + 2) as u16
    }

    pub fn is_decisive(self) -> bool {
        self != Wdl::Draw
    }
}

impl Neg for Wdl {
    type Output = Wdl;

    fn neg(self) -> Wdl {
        match self {
            Wdl::Loss => Wdl::Win,
            Wdl::BlessedLoss => Wdl::CursedWin,
            Wdl::Draw => Wdl::Draw,
            Wdl::CursedWin => Wdl::BlessedLoss,
            Wdl::Win => Wdl::Loss,
        }
    }
}

impl From<Wdl> for i8 {
    #[inline]
    fn from(wdl: Wdl) -> i8 {
        wdl as i8
    }
}

impl From<Wdl> for i32 {
    #[inline]
    fn from(wdl: Wdl) -> i32 {
        i32::from(i8::from(wdl))
    }
}

/// Distance to zeroing of the half-move clock, in plies.
///
/// Positive for wins, negative for losses, zero for draws. Values with an
/// absolute value above 100 are cursed wins or blessed losses.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Dtz(pub i32);

impl Dtz {
    /// The distance for a position whose best move is zeroing, given its
    /// [`Wdl`] value.
    ///
    /// | `Wdl` | `Dtz` |
    /// | --- | --- |
    /// | `Loss` | -1 |
    /// | `BlessedLoss` | -101 |
    /// | `Draw` | 0 |
    /// | `CursedWin` | 101 |
    /// | `Win` | 1 |
    pub fn before_zeroing(wdl: Wdl) -> Dtz {
        Dtz(match wdl {
            Wdl::Loss => -1,
            Wdl::BlessedLoss => -101,
            Wdl::Draw => 0,
            Wdl::CursedWin => 101,
            Wdl::Win => 1,
        })
    }

    /// Increases the absolute value by `plies`, keeping the sign.
    #[must_use]
    pub fn add_plies(self, plies: i32) -> Dtz {
        Dtz(self.0 + self.0.signum() * plies)
    }

    pub fn signum(self) -> i32 {
        self.0.signum()
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Neg for Dtz {
    type Output = Dtz;

    #[inline]
    fn neg(self) -> Dtz {
        Dtz(-self.0)
    }
}

impl From<Dtz> for i32 {
    #[inline]
    fn from(dtz: Dtz) -> i32 {
        dtz.0
    }
}

impl fmt::Display for Dtz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Table metric.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Metric {
    /// WDL<sub>50</sub>.
    Wdl,
    /// DTZ<sub>50</sub>′′, potentially with rounding.
    Dtz,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Metric::Wdl => "wdl",
            Metric::Dtz => "dtz",
        })
    }
}

/// Additional probe information from the brief capture search.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ProbeState {
    /// Normal probe.
    Normal,
    /// Best move is zeroing (a capture or en passant capture), so the
    /// distance is known without consulting a DTZ table.
    ZeroingBestMove,
}

/// A probed value with the state in which it was resolved.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Probe<T> {
    pub value: T,
    pub state: ProbeState,
}

impl<T> Probe<T> {
    pub(crate) fn normal(value: T) -> Probe<T> {
        Probe {
            value,
            state: ProbeState::Normal,
        }
    }

    pub(crate) fn zeroing(value: T) -> Probe<T> {
        Probe {
            value,
            state: ProbeState::ZeroingBestMove,
        }
    }

    pub fn is_zeroing(&self) -> bool {
        self.state == ProbeState::ZeroingBestMove
    }
}
