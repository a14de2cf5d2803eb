use std::fmt;

use itertools::Itertools;

use super::Cell;
use crate::schema::Schema;

/// One row, as an ordered list of cells matching a row-type descriptor.
#[derive(PartialEq, Default)]
pub struct Tuple {
    cells: Vec<Cell>,
}

impl Clone for Tuple {
    fn clone(&self) -> Self {
        Self {
            cells: self.cells.clone(),
        }
    }

    // reuses the cell vector's allocation
    fn clone_from(&mut self, source: &Self) {
        self.cells.clone_from(&source.cells);
    }
}

impl Tuple {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// A tuple with one placeholder cell per field. Unmarshalling into it
    /// reuses the cells' storage.
    pub fn scratch(schema: &Schema) -> Self {
        let cells = schema
            .get_fields()
            .iter()
            .map(|field| Cell::default_for(&field.t))
            .collect();
        Self { cells }
    }

    pub fn new_int_tuple(value: i64, width: usize) -> Self {
        Self {
            cells: vec![Cell::Int64(value); width],
        }
    }
}

impl Tuple {
    pub fn get_cell(&self, i: usize) -> &Cell {
        &self.cells[i]
    }

    pub fn get_cell_mut(&mut self, i: usize) -> &mut Cell {
        &mut self.cells[i]
    }

    pub fn set_cell(&mut self, i: usize, cell: Cell) {
        self.cells[i] = cell;
    }

    pub fn get_cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Make the cell count equal to `schema`'s field count, seeding any new
    /// cells from the field types.
    pub(crate) fn conform(&mut self, schema: &Schema) {
        if self.cells.len() == schema.len() {
            return;
        }
        self.cells.truncate(schema.len());
        for field in &schema.get_fields()[self.cells.len()..] {
            self.cells.push(Cell::default_for(&field.t));
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{{}}}", self.cells.iter().join(", "))
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
