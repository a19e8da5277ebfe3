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

use arrayvec::ArrayVec;
use bitflags::bitflags;
use shakmaty::{Bitboard, Piece, Position, Role, Square};

use crate::{
    errors::ProbeResult,
    material::{Material, MaterialKey},
    types::{Metric, Wdl, MAX_PIECES},
};

bitflags! {
    /// Flags of a DTZ subtable.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
    pub struct DtzFlags: u8 {
        /// The subtable stores positions with black to move (in table
        /// orientation).
        const STM = 1;
        /// Raw values have to be remapped with [`TableData::map_dtz()`].
        const MAPPED = 2;
        /// Wins are stored in plies rather than moves.
        const WIN_PLIES = 4;
        /// Losses are stored in plies rather than moves.
        const LOSS_PLIES = 8;
    }
}

/// Pieces in the order used for indexing.
pub type Pieces = ArrayVec<Piece, MAX_PIECES>;

/// A subtable for one side to move.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SubTable {
    /// Piece order. For tables with pawns the leading pawns come first.
    pub pieces: Pieces,
    /// Always empty for WDL tables.
    pub flags: DtzFlags,
}

/// Subtables for white to move and black to move, or just a single one for
/// symmetric WDL tables and all DTZ tables.
pub type Sides = ArrayVec<SubTable, 2>;

/// Decoder for the values of a loaded table.
///
/// `file` selects the subtable of the leading pawn file (always 0 for
/// tables without pawns) and `side` the subtable in [`Sides`].
pub trait TableData: Send + Sync {
    /// Orders the leading pawns in `squares[..lead_pawns]` and returns the
    /// file subtable index in `0..4`.
    fn lead_pawn_file(&self, squares: &mut [Square], lead_pawns: usize) -> usize;

    /// Computes the index of the position. `squares` are in table
    /// orientation and ordered like the pieces of the subtable.
    fn encode(&self, file: usize, side: usize, squares: &[Square]) -> u64;

    /// Reads the raw value at `idx`.
    fn decompress(&self, file: usize, side: usize, idx: u64) -> ProbeResult<u16>;

    /// Remaps a raw DTZ value of a subtable with [`DtzFlags::MAPPED`].
    fn map_dtz(&self, file: usize, wdl: Wdl, raw: u16) -> ProbeResult<u16> {
        let _ = (file, wdl);
        Ok(raw)
    }
}

/// Source of tables, e.g. files in a directory.
pub trait TableLoader {
    type Data: TableData;

    /// Checks if a table is available, without loading it. `material` is
    /// normalized.
    fn exists(&self, material: &Material, metric: Metric) -> bool;

    /// Loads a table. `material` is normalized.
    fn load(&self, material: &Material, metric: Metric) -> ProbeResult<TableEntry<Self::Data>>;
}

/// Shared header of loaded tables.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TableHeader {
    material: Material,
    key: MaterialKey,
    symmetric: bool,
}

impl TableHeader {
    fn new(material: Material) -> TableHeader {
        TableHeader {
            key: material.key(),
            symmetric: material.is_symmetric(),
            material,
        }
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    /// Key of the table orientation. Positions with the mirrored key are
    /// probed with colors swapped.
    pub fn key(&self) -> MaterialKey {
        self.key
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }
}

/// A loaded table.
#[derive(Debug)]
pub enum TableEntry<D> {
    /// Table without pawns.
    Piece {
        header: TableHeader,
        sides: Sides,
        data: D,
    },
    /// Table with pawns, with subtables for each leading pawn file (a-d).
    Pawn {
        header: TableHeader,
        files: ArrayVec<Sides, 4>,
        data: D,
    },
}

/// Result of a DTZ table lookup.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum DtzLookup {
    /// Plies to zeroing, not yet signed.
    Found(i32),
    /// The table stores only the other side to move.
    OtherSide,
}

impl<D> TableEntry<D> {
    /// Table without pawns. `material` must be normalized.
    pub fn pieces(material: Material, sides: Sides, data: D) -> ProbeResult<TableEntry<D>> {
        ensure!(material.is_normalized() && !material.has_pawns());
        validate_sides(&material, &sides)?;
        Ok(TableEntry::Piece {
            header: TableHeader::new(material),
            sides,
            data,
        })
    }

    /// Table with pawns. `material` must be normalized, and all subtables
    /// must start with the same leading pawn.
    pub fn pawns(material: Material, files: ArrayVec<Sides, 4>, data: D) -> ProbeResult<TableEntry<D>> {
        ensure!(material.is_normalized() && material.has_pawns());
        ensure!(files.is_full());
        let reference = u!(files[0].first().and_then(|side| side.pieces.first()).copied());
        ensure!(reference.role == Role::Pawn);
        for sides in &files {
            validate_sides(&material, sides)?;
            ensure!(sides.iter().all(|side| side.pieces.first() == Some(&reference)));
        }
        Ok(TableEntry::Pawn {
            header: TableHeader::new(material),
            files,
            data,
        })
    }

    pub fn header(&self) -> &TableHeader {
        match self {
            TableEntry::Piece { header, .. } | TableEntry::Pawn { header, .. } => header,
        }
    }

    pub fn material(&self) -> &Material {
        self.header().material()
    }

    pub fn data(&self) -> &D {
        match self {
            TableEntry::Piece { data, .. } | TableEntry::Pawn { data, .. } => data,
        }
    }
}

fn validate_sides(material: &Material, sides: &Sides) -> ProbeResult<()> {
    ensure!(!sides.is_empty());
    for side in sides {
        ensure!(Material::from_pieces(side.pieces.iter().copied()) == *material);
    }
    Ok(())
}

impl<D: TableData> TableEntry<D> {
    /// Looks up the raw value of a position with material `key`. Returns
    /// `None` if this is a DTZ table for the other side to move.
    fn lookup<S: Position>(&self, pos: &S, key: MaterialKey, metric: Metric) -> ProbeResult<Option<(usize, &SubTable, u16)>> {
        let header = self.header();
        ensure!(key == header.key || key == header.key.mirrored());

        let symmetric_btm = header.symmetric && pos.turn().is_black();
        let black_stronger = key != header.key;
        let flip = symmetric_btm || black_stronger;
        let bside = pos.turn().is_black() ^ flip;

        let board = pos.board();
        let mut squares: ArrayVec<Square, MAX_PIECES> = ArrayVec::new();
        let mut used = Bitboard(0);

        // For pawns there are subtables for each file the leading pawn can
        // be placed on.
        let (file, sides) = match self {
            TableEntry::Piece { sides, .. } => (0, sides),
            TableEntry::Pawn { files, data, .. } => {
                let reference_pawn = u!(files[0].first().and_then(|side| side.pieces.first()));
                let color = reference_pawn.color ^ flip;

                let lead_pawns = board.pawns() & board.by_color(color);
                used.extend(lead_pawns);
                for square in lead_pawns {
                    u!(squares
                        .try_push(if flip { square.flip_vertical() } else { square })
                        .ok());
                }

                let lead_pawns_count = squares.len();
                let file = data.lead_pawn_file(&mut squares, lead_pawns_count);
                (file, u!(files.get(file)))
            }
        };

        let side_idx = if bside { sides.len() - 1 } else { 0 };
        let side = &sides[side_idx];

        // DTZ tables store only one side to move. It is possible that we
        // have to check the other side (by doing a 1-ply search).
        if metric == Metric::Dtz
            && side.flags.contains(DtzFlags::STM) != bside
            && (!header.symmetric || matches!(self, TableEntry::Pawn { .. }))
        {
            return Ok(None);
        }

        // So far squares has been initialized with the leading pawns.
        // Also add the other pieces.
        let lead_pawns_count = squares.len();
        for piece in side.pieces.iter().skip(lead_pawns_count) {
            let color = piece.color ^ flip;
            let square = u!((board.by_piece(piece.role.of(color)) & !used).first());
            u!(squares
                .try_push(if flip { square.flip_vertical() } else { square })
                .ok());
            used.add(square);
        }
        ensure!(squares.len() == side.pieces.len());

        let data = self.data();
        let idx = data.encode(file, side_idx, &squares);
        Ok(Some((file, side, data.decompress(file, side_idx, idx)?)))
    }

    pub(crate) fn probe_wdl<S: Position>(&self, pos: &S, key: MaterialKey) -> ProbeResult<Wdl> {
        let (_, _, raw) = u!(self.lookup(pos, key, Metric::Wdl)?);
        Ok(u!(Wdl::from_raw(raw)))
    }

    /// Plies to zeroing, given the (non-draw) `wdl` of the position.
    pub(crate) fn probe_dtz<S: Position>(&self, pos: &S, key: MaterialKey, wdl: Wdl) -> ProbeResult<DtzLookup> {
        let Some((file, side, raw)) = self.lookup(pos, key, Metric::Dtz)? else {
            return Ok(DtzLookup::OtherSide);
        };

        let raw = if side.flags.contains(DtzFlags::MAPPED) {
            self.data().map_dtz(file, wdl, raw)?
        } else {
            raw
        };

        let stored_in_plies = match wdl {
            Wdl::Win => side.flags.contains(DtzFlags::WIN_PLIES),
            Wdl::Loss => side.flags.contains(DtzFlags::LOSS_PLIES),
            Wdl::CursedWin | Wdl::BlessedLoss | Wdl::Draw => false,
        };

        let plies = i32::from(raw);
        Ok(DtzLookup::Found(if stored_in_plies { plies } else { plies * 2 }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use shakmaty::{fen::Fen, CastlingMode, Chess, Color};

    use super::*;
    use crate::memory::MemoryLoader;

    fn position(fen: &str) -> Chess {
        fen.parse::<Fen>()
            .expect("valid fen")
            .into_position(CastlingMode::Standard)
            .expect("legal position")
    }

    fn krk_recorder() -> (MemoryLoader, Arc<Mutex<Vec<(Color, Vec<Square>)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut loader = MemoryLoader::new();
        let record = Arc::clone(&seen);
        loader
            .add_wdl("KRvK", move |stm, squares| {
                record.lock().expect("lock").push((stm, squares.to_vec()));
                if stm == Color::White {
                    Wdl::Win
                } else {
                    Wdl::Loss
                }
            })
            .expect("valid material");
        (loader, seen)
    }

    #[test]
    fn test_mirrored_lookup_reads_same_squares() {
        let (loader, seen) = krk_recorder();
        let material: Material = "KRvK".parse().expect("valid material");
        let entry = loader.load(&material, Metric::Wdl).expect("loaded");

        let pos = position("k7/8/1K6/8/8/8/8/7R w - - 0 1");
        let key = MaterialKey::from_board(pos.board(), false);
        assert_eq!(entry.probe_wdl(&pos, key).expect("probed"), Wdl::Win);

        let mirrored = position("7r/8/8/8/8/1k6/8/K7 b - - 0 1");
        let mirrored_key = MaterialKey::from_board(mirrored.board(), false);
        assert_eq!(mirrored_key, key.mirrored());
        assert_eq!(entry.probe_wdl(&mirrored, mirrored_key).expect("probed"), Wdl::Win);

        let seen = seen.lock().expect("lock");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0], (Color::White, vec![Square::B6, Square::H1, Square::A8]));
    }

    #[test]
    fn test_dtz_other_side() {
        let mut loader = MemoryLoader::new();
        loader.add_dtz("KRvK", Color::White, |_| 10).expect("valid material");
        let material: Material = "KRvK".parse().expect("valid material");
        let entry = loader.load(&material, Metric::Dtz).expect("loaded");

        let pos = position("k7/8/1K6/8/8/8/8/7R w - - 0 1");
        let key = MaterialKey::from_board(pos.board(), false);
        assert_eq!(entry.probe_dtz(&pos, key, Wdl::Win).expect("probed"), DtzLookup::Found(10));

        let pos = position("k7/8/1K6/8/8/8/8/7R b - - 0 1");
        assert_eq!(entry.probe_dtz(&pos, key, Wdl::Loss).expect("probed"), DtzLookup::OtherSide);
    }

    #[test]
    fn test_dtz_move_units_are_doubled() {
        let mut loader = MemoryLoader::new();
        loader
            .add_dtz_with_flags("KRvK", Color::White, DtzFlags::empty(), |_| 10)
            .expect("valid material");
        let material: Material = "KRvK".parse().expect("valid material");
        let entry = loader.load(&material, Metric::Dtz).expect("loaded");

        let pos = position("k7/8/1K6/8/8/8/8/7R w - - 0 1");
        let key = MaterialKey::from_board(pos.board(), false);
        assert_eq!(entry.probe_dtz(&pos, key, Wdl::Win).expect("probed"), DtzLookup::Found(20));

        let mut loader = MemoryLoader::new();
        loader
            .add_dtz_with_flags("KRvK", Color::White, DtzFlags::WIN_PLIES, |_| 10)
            .expect("valid material");
        let entry = loader.load(&material, Metric::Dtz).expect("loaded");
        assert_eq!(entry.probe_dtz(&pos, key, Wdl::Win).expect("probed"), DtzLookup::Found(10));
        assert_eq!(entry.probe_dtz(&pos, key, Wdl::CursedWin).expect("probed"), DtzLookup::Found(20));
    }

    #[test]
    fn test_rejects_inconsistent_pieces() {
        let material: Material = "KRvK".parse().expect("valid material");
        let mut sides = Sides::new();
        sides.push(SubTable {
            pieces: [Color::White.king(), Color::White.queen(), Color::Black.king()]
                .into_iter()
                .collect(),
            flags: DtzFlags::empty(),
        });
        assert!(TableEntry::pieces(material, sides, ()).is_err());
    }
}
