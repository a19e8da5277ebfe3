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

//! Tables synthesised in memory.
//!
//! Values are computed on demand by closures over the piece squares in
//! table orientation. This is useful for testing engines against small,
//! handcrafted endgames without table files.

use std::{fmt, io, sync::Arc};

use arrayvec::ArrayVec;
use rustc_hash::FxHashMap;
use shakmaty::{Color, File, Piece, Role, Square};

use crate::{
    errors::{ProbeError, ProbeResult},
    material::{Material, ParseMaterialError},
    table::{DtzFlags, Pieces, Sides, SubTable, TableData, TableEntry, TableLoader},
    types::{Metric, Wdl, MAX_PIECES},
};

type WdlFn = dyn Fn(Color, &[Square]) -> Wdl + Send + Sync;
type DtzFn = dyn Fn(&[Square]) -> u16 + Send + Sync;

#[derive(Clone)]
enum Source {
    Wdl(Arc<WdlFn>),
    Dtz {
        stm: Color,
        flags: DtzFlags,
        values: Arc<DtzFn>,
    },
    Corrupted,
}

/// Decoder of tables loaded by [`MemoryLoader`].
///
/// The index of a position packs the squares with 6 bits each.
#[derive(Clone)]
pub struct MemoryData {
    source: Source,
    num_pieces: usize,
}

impl fmt::Debug for MemoryData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryData")
            .field("num_pieces", &self.num_pieces)
            .finish_non_exhaustive()
    }
}

fn folded_file(square: Square) -> usize {
    let file = square.file();
    if file >= File::E {
        File::H as usize - file as usize
    } else {
        file as usize
    }
}

impl TableData for MemoryData {
    fn lead_pawn_file(&self, squares: &mut [Square], lead_pawns: usize) -> usize {
        for i in 1..lead_pawns {
            if folded_file(squares[i]) < folded_file(squares[0]) {
                squares.swap(0, i);
            }
        }
        squares.first().map_or(0, |sq| folded_file(*sq))
    }

    fn encode(&self, _file: usize, _side: usize, squares: &[Square]) -> u64 {
        squares
            .iter()
            .enumerate()
            .fold(0, |idx, (i, sq)| idx | (u64::from(u32::from(*sq)) << (6 * i)))
    }

    fn decompress(&self, _file: usize, side: usize, idx: u64) -> ProbeResult<u16> {
        let mut squares: ArrayVec<Square, 8> = ArrayVec::new();
        for i in 0..self.num_pieces {
            u!(squares.try_push(Square::new(((idx >> (6 * i)) & 63) as u32)).ok());
        }

        match &self.source {
            Source::Wdl(values) => Ok(values(Color::from_white(side == 0), &squares).to_raw()),
            Source::Dtz { values, .. } => Ok(values(&squares)),
            Source::Corrupted => throw!(),
        }
    }
}

/// A [`TableLoader`] for tables computed by closures.
///
/// Piece order of the squares passed to the closures: white king to pawns,
/// then black king to pawns, in the orientation of the table name. Tables
/// with pawns list the leading pawns (those of white, or black if white has
/// none) first.
#[derive(Default, Clone)]
pub struct MemoryLoader {
    tables: FxHashMap<(Material, Metric), Source>,
}

impl fmt::Debug for MemoryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.tables.keys().map(|(material, metric)| format!("{material}.{metric}")))
            .finish()
    }
}

fn parse_normalized(name: &str) -> Result<Material, ParseMaterialError> {
    let material: Material = name.parse()?;
    if material.is_normalized() {
        Ok(material)
    } else {
        Err(ParseMaterialError)
    }
}

impl MemoryLoader {
    pub fn new() -> MemoryLoader {
        MemoryLoader::default()
    }

    /// Adds a WDL table. The closure gets the side to move and the squares
    /// in table orientation.
    ///
    /// # Errors
    ///
    /// Errors if `name` is not a valid table name with the stronger side
    /// first.
    pub fn add_wdl<F>(&mut self, name: &str, values: F) -> Result<&mut MemoryLoader, ParseMaterialError>
    where
        F: Fn(Color, &[Square]) -> Wdl + Send + Sync + 'static,
    {
        let material = parse_normalized(name)?;
        self.tables.insert((material, Metric::Wdl), Source::Wdl(Arc::new(values)));
        Ok(self)
    }

    /// Adds a DTZ table storing positions with `stm` to move. Values are
    /// plies to zeroing.
    ///
    /// # Errors
    ///
    /// Errors if `name` is not a valid table name with the stronger side
    /// first.
    pub fn add_dtz<F>(&mut self, name: &str, stm: Color, values: F) -> Result<&mut MemoryLoader, ParseMaterialError>
    where
        F: Fn(&[Square]) -> u16 + Send + Sync + 'static,
    {
        self.add_dtz_with_flags(name, stm, DtzFlags::WIN_PLIES | DtzFlags::LOSS_PLIES, values)
    }

    /// Adds a DTZ table with explicit flags. [`DtzFlags::STM`] is derived
    /// from `stm`.
    ///
    /// # Errors
    ///
    /// Errors if `name` is not a valid table name with the stronger side
    /// first.
    pub fn add_dtz_with_flags<F>(&mut self, name: &str, stm: Color, flags: DtzFlags, values: F) -> Result<&mut MemoryLoader, ParseMaterialError>
    where
        F: Fn(&[Square]) -> u16 + Send + Sync + 'static,
    {
        let material = parse_normalized(name)?;
        self.tables.insert(
            (material, Metric::Dtz),
            Source::Dtz {
                stm,
                flags: flags - DtzFlags::STM,
                values: Arc::new(values),
            },
        );
        Ok(self)
    }

    /// Adds a table that is reported as available, but fails to load.
    ///
    /// # Errors
    ///
    /// Errors if `name` is not a valid table name with the stronger side
    /// first.
    pub fn add_corrupted(&mut self, name: &str, metric: Metric) -> Result<&mut MemoryLoader, ParseMaterialError> {
        let material = parse_normalized(name)?;
        self.tables.insert((material, metric), Source::Corrupted);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn piece_order(material: &Material) -> Pieces {
    let lead_color = if material.white.has_pawns() {
        Color::White
    } else {
        Color::Black
    };
    let lead_pawn = Piece {
        color: lead_color,
        role: Role::Pawn,
    };

    let mut pieces = Pieces::new();
    if material.has_pawns() {
        pieces.extend(material.pieces().filter(|p| *p == lead_pawn));
        pieces.extend(material.pieces().filter(|p| *p != lead_pawn));
    } else {
        pieces.extend(material.pieces());
    }
    pieces
}

impl TableLoader for MemoryLoader {
    type Data = MemoryData;

    fn exists(&self, material: &Material, metric: Metric) -> bool {
        self.tables.contains_key(&(material.clone(), metric))
    }

    fn load(&self, material: &Material, metric: Metric) -> ProbeResult<TableEntry<MemoryData>> {
        let source = self
            .tables
            .get(&(material.clone(), metric))
            .cloned()
            .ok_or_else(|| ProbeError::Read {
                error: io::Error::from(io::ErrorKind::NotFound),
            })?;

        if matches!(source, Source::Corrupted) {
            throw!();
        }
        ensure!(material.count() <= MAX_PIECES);
        let pieces = piece_order(material);

        let mut sides = Sides::new();
        match &source {
            Source::Dtz { stm, flags, .. } => sides.push(SubTable {
                pieces,
                flags: if stm.is_black() {
                    *flags | DtzFlags::STM
                } else {
                    *flags
                },
            }),
            Source::Wdl(_) | Source::Corrupted => {
                sides.push(SubTable {
                    pieces: pieces.clone(),
                    flags: DtzFlags::empty(),
                });
                if !material.is_symmetric() {
                    sides.push(SubTable {
                        pieces,
                        flags: DtzFlags::empty(),
                    });
                }
            }
        }

        let data = MemoryData {
            source,
            num_pieces: material.count(),
        };

        if material.has_pawns() {
            TableEntry::pawns(material.clone(), (0..4).map(|_| sides.clone()).collect(), data)
        } else {
            TableEntry::pieces(material.clone(), sides, data)
        }
    }
}
