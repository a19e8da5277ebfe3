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

use std::{cmp::Ordering, error::Error, fmt, str::FromStr};

use shakmaty::{Board, Color, Piece, Role};

/// Piece counts of one side, indexed by `role as usize - 1`.
#[derive(Clone, Eq, PartialEq, Hash, Default)]
pub struct MaterialSide {
    by_role: [u8; 6],
}

impl MaterialSide {
    fn from_str_part(s: &str) -> Result<MaterialSide, ParseMaterialError> {
        let mut side = MaterialSide::default();
        for ch in s.chars() {
            let role = Role::from_char(ch).ok_or(ParseMaterialError)?;
            let count = &mut side.by_role[role as usize - 1];
            if *count >= 15 {
                return Err(ParseMaterialError);
            }
            *count += 1;
        }
        Ok(side)
    }

    fn from_board(board: &Board, color: Color) -> MaterialSide {
        let mut side = MaterialSide::default();
        for role in Role::ALL {
            let count = board.by_piece(Piece { color, role }).count();
            side.by_role[role as usize - 1] = u8::try_from(count).unwrap_or(u8::MAX);
        }
        side
    }

    pub fn get(&self, role: Role) -> u8 {
        self.by_role[role as usize - 1]
    }

    pub fn count(&self) -> usize {
        self.by_role.iter().copied().map(usize::from).sum()
    }

    pub fn has_pawns(&self) -> bool {
        self.get(Role::Pawn) > 0
    }
}

impl Ord for MaterialSide {
    fn cmp(&self, other: &MaterialSide) -> Ordering {
        // Kings first, pawns last.
        self.count()
            .cmp(&other.count())
            .then_with(|| self.by_role.iter().rev().cmp(other.by_role.iter().rev()))
    }
}

impl PartialOrd for MaterialSide {
    fn partial_cmp(&self, other: &MaterialSide) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MaterialSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for role in Role::ALL.into_iter().rev() {
            for _ in 0..self.get(role) {
                write!(f, "{}", role.upper_char())?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MaterialSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count() > 0 {
            <Self as fmt::Display>::fmt(self, f)
        } else {
            f.write_str("-")
        }
    }
}

/// Error when parsing an invalid material configuration like `KRvK`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParseMaterialError;

impl fmt::Display for ParseMaterialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid material configuration")
    }
}

impl Error for ParseMaterialError {}

/// A material configuration, i.e. the number of pieces of each kind.
///
/// Displayed and parsed in table name notation, white pieces first:
/// `KRPvKP`.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Material {
    pub white: MaterialSide,
    pub black: MaterialSide,
}

impl Material {
    /// Get the material configuration for a [`Board`].
    pub fn from_board(board: &Board) -> Material {
        Material {
            white: MaterialSide::from_board(board, Color::White),
            black: MaterialSide::from_board(board, Color::Black),
        }
    }

    pub(crate) fn from_pieces<I>(iter: I) -> Material
    where
        I: IntoIterator<Item = Piece>,
    {
        let mut material = Material {
            white: MaterialSide::default(),
            black: MaterialSide::default(),
        };
        for piece in iter {
            let side = match piece.color {
                Color::White => &mut material.white,
                Color::Black => &mut material.black,
            };
            let count = &mut side.by_role[piece.role as usize - 1];
            *count = count.saturating_add(1);
        }
        material
    }

    pub fn by_color(&self, color: Color) -> &MaterialSide {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    pub fn count(&self) -> usize {
        self.white.count() + self.black.count()
    }

    pub fn is_symmetric(&self) -> bool {
        self.white == self.black
    }

    pub fn has_pawns(&self) -> bool {
        self.white.has_pawns() || self.black.has_pawns()
    }

    /// Swaps the colors.
    #[must_use]
    pub fn into_swapped(self) -> Material {
        Material {
            white: self.black,
            black: self.white,
        }
    }

    /// Puts the stronger side first, as in table names.
    #[must_use]
    pub fn into_normalized(self) -> Material {
        if self.white < self.black {
            self.into_swapped()
        } else {
            self
        }
    }

    pub fn is_normalized(&self) -> bool {
        self.white >= self.black
    }

    /// Pieces in canonical order: white king to pawns, then black king to
    /// pawns.
    pub fn pieces(&self) -> impl Iterator<Item = Piece> + '_ {
        Color::ALL.into_iter().flat_map(move |color| {
            Role::ALL.into_iter().rev().flat_map(move |role| {
                (0..self.by_color(color).get(role)).map(move |_| Piece { color, role })
            })
        })
    }

    fn piece_counts(&self) -> [u8; 16] {
        let mut pcs = [0; 16];
        for role in Role::ALL {
            pcs[role as usize] = self.white.get(role);
            pcs[8 + role as usize] = self.black.get(role);
        }
        pcs
    }

    pub fn key(&self) -> MaterialKey {
        MaterialKey::from_piece_counts(&self.piece_counts(), false)
    }
}

/// All normalized material configurations with at least 3 and at most
/// `max_pieces` pieces, one king per side.
pub(crate) fn enumerate(max_pieces: usize) -> Vec<Material> {
    let mut sides = vec![MaterialSide::default()];
    sides[0].by_role[Role::King as usize - 1] = 1;
    for role in [Role::Queen, Role::Rook, Role::Bishop, Role::Knight, Role::Pawn] {
        sides = sides
            .into_iter()
            .flat_map(|side| {
                let budget = max_pieces.saturating_sub(side.count() + 1);
                (0..=budget.min(8)).map(move |n| {
                    let mut side = side.clone();
                    side.by_role[role as usize - 1] = n as u8;
                    side
                })
            })
            .collect();
    }

    let mut materials = Vec::new();
    for white in &sides {
        for black in &sides {
            let count = white.count() + black.count();
            if white >= black && (3..=max_pieces).contains(&count) {
                materials.push(Material {
                    white: white.clone(),
                    black: black.clone(),
                });
            }
        }
    }
    materials
}

impl FromStr for Material {
    type Err = ParseMaterialError;

    fn from_str(s: &str) -> Result<Material, ParseMaterialError> {
        if s.len() > 64 + 1 {
            return Err(ParseMaterialError);
        }

        let (white, black) = s.split_once('v').ok_or(ParseMaterialError)?;
        let material = Material {
            white: MaterialSide::from_str_part(white)?,
            black: MaterialSide::from_str_part(black)?,
        };
        if material.white.get(Role::King) != 1 || material.black.get(Role::King) != 1 {
            return Err(ParseMaterialError);
        }
        Ok(material)
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.white, self.black)
    }
}

impl fmt::Debug for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}v{:?}", self.white, self.black)
    }
}

/// A 64-bit signature of a material configuration.
///
/// Each (color, role) count occupies a 4-bit lane, white in the low and
/// black in the high half. Swapping colors is therefore rotating by 32
/// bits, see [`MaterialKey::mirrored()`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct MaterialKey(pub u64);

impl MaterialKey {
    /// Computes the key from engine style piece counts.
    ///
    /// `pcs[1..=6]` are the white pawn, knight, bishop, rook, queen and king
    /// counts, `pcs[9..=14]` the black ones. With `mirror` the colors are
    /// swapped.
    pub fn from_piece_counts(pcs: &[u8; 16], mirror: bool) -> MaterialKey {
        let (white, black) = if mirror { (8, 0) } else { (0, 8) };
        let mut key = 0;
        for role in Role::ALL {
            let shift = 4 * (role as u32 - 1);
            key += u64::from(pcs[white + role as usize]) << shift;
            key += u64::from(pcs[black + role as usize]) << (32 + shift);
        }
        MaterialKey(key)
    }

    /// Key of the material on `board`, with colors swapped if `mirror`.
    pub fn from_board(board: &Board, mirror: bool) -> MaterialKey {
        let key = Material::from_board(board).key();
        if mirror {
            key.mirrored()
        } else {
            key
        }
    }

    /// Key of the same material with colors swapped.
    #[must_use]
    pub fn mirrored(self) -> MaterialKey {
        MaterialKey(self.0.rotate_left(32))
    }
}
