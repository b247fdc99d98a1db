use enum_iterator::IntoEnumIterator;

use std::fmt;


/// Position of a tile within the grid of a single zoom level.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Coord {
        Coord { x, y }
    }

    /// Coordinate of the tile one zoom level up that contains this tile.
    pub fn parent(&self) -> Coord {
        Coord {
            x: self.x.div_euclid(2),
            y: self.y.div_euclid(2),
        }
    }

    pub fn child(&self, dx: i32, dy: i32) -> Coord {
        Coord {
            x: (self.x * 2) + dx,
            y: (self.y * 2) + dy,
        }
    }

    pub fn children(&self) -> [Coord; 4] {
        let mut result = [Coord::default(); 4];
        for (slot, quadrant) in Quadrant::into_enum_iter().enumerate() {
            result[slot] = quadrant.child_of(self);
        }
        return result;
    }

    pub fn child_box(&self) -> CoordBox {
        CoordBox {
            min_x: self.x * 2,
            max_x: (self.x * 2) + 1,
            min_y: self.y * 2,
            max_y: (self.y * 2) + 1,
        }
    }

    /// File name stem for this coordinate, unique per (x, y).
    pub fn name(&self) -> String {
        format!("{}_{}", self.x, self.y)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Inclusive rectangle of coordinates within one zoom level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CoordBox {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl CoordBox {
    pub fn contains(&self, coord: &Coord) -> bool {
        coord.x >= self.min_x && coord.x <= self.max_x
            && coord.y >= self.min_y && coord.y <= self.max_y
    }
}

/// One of the four child slots of a parent tile.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoEnumIterator)]
pub enum Quadrant {
    TopLeft,
    BottomLeft,
    TopRight,
    BottomRight,
}

impl Quadrant {
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Quadrant::TopLeft => (0, 0),
            Quadrant::BottomLeft => (0, 1),
            Quadrant::TopRight => (1, 0),
            Quadrant::BottomRight => (1, 1),
        }
    }

    pub fn child_of(&self, parent: &Coord) -> Coord {
        let (dx, dy) = self.offset();
        parent.child(dx, dy)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::error::Error;

    #[test]
    fn test_parent_of_positive_coords() -> Result<(), Box<dyn Error>> {
        assert_eq!(Coord::new(0, 0), Coord::new(1, 1).parent(), "Incorrect parent");
        assert_eq!(Coord::new(2, 3), Coord::new(4, 7).parent(), "Incorrect parent");
        assert_eq!(Coord::new(2, 3), Coord::new(5, 6).parent(), "Incorrect parent");
        Ok(())
    }

    #[test]
    fn test_parent_of_negative_coords_rounds_down() -> Result<(), Box<dyn Error>> {
        assert_eq!(Coord::new(-1, -1), Coord::new(-1, -2).parent(), "Incorrect parent");
        assert_eq!(Coord::new(-2, 0), Coord::new(-3, 1).parent(), "Incorrect parent");
        assert_eq!(Coord::new(-2, -3), Coord::new(-4, -5).parent(), "Incorrect parent");
        Ok(())
    }

    #[test]
    fn test_grandparent_matches_scale_down_by_four() -> Result<(), Box<dyn Error>> {
        for x in -17..17 {
            for y in -17..17 {
                let coord = Coord::new(x, y);
                let expected = Coord::new(x.div_euclid(4), y.div_euclid(4));
                assert_eq!(expected, coord.parent().parent(), "Incorrect grandparent of {}", coord);
            }
        }
        Ok(())
    }

    #[test]
    fn test_children_of_parent_include_coord() -> Result<(), Box<dyn Error>> {
        for x in -9..9 {
            for y in -9..9 {
                let coord = Coord::new(x, y);
                let parent = coord.parent();
                assert!(parent.children().contains(&coord), "{} missing from children of {}", coord, parent);
                assert!(parent.child_box().contains(&coord), "{} missing from child box of {}", coord, parent);
                for child in parent.children().iter() {
                    assert_eq!(parent, child.parent(), "Child {} does not map back to {}", child, parent);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_children_slot_order() -> Result<(), Box<dyn Error>> {
        let children = Coord::new(3, -2).children();
        assert_eq!(
            [Coord::new(6, -4), Coord::new(6, -3), Coord::new(7, -4), Coord::new(7, -3)],
            children,
            "Unexpected child slot order"
        );
        Ok(())
    }

    #[test]
    fn test_name_is_unique() -> Result<(), Box<dyn Error>> {
        let mut names = HashSet::new();
        for x in -12..12 {
            for y in -12..12 {
                let name = Coord::new(x, y).name();
                assert!(
                    name.chars().all(|c| c.is_ascii_digit() || c == '-' || c == '_'),
                    "Name {} is not filesystem safe", name
                );
                assert!(names.insert(name), "Duplicate name for ({}, {})", x, y);
            }
        }
        assert_eq!("12_-3", Coord::new(12, -3).name(), "Unexpected name format");
        Ok(())
    }
}
