//! ndarray handles
//!
//! A stored array is an object with a `shape` tuple, a `dtype` text and one
//! item per element at its row-major flat index. A view is that object plus
//! an optional selection of flat positions with its own shape, so indexing,
//! reshaping and flattening never touch the rows.

use crate::array::{DType, NdArray};
use crate::codec::{DTYPE_KEY, SHAPE_KEY, decode_dtype, decode_shape};
use crate::database::{Database, Referrer};
use crate::index::{self, Index, size_of};
use crate::storage::Slot;
use crate::value::Value;
use crate::{Error, Result};

use super::{Handle, Scalar, Stored};

pub struct ArrayView<'db> {
    db: &'db Database,
    id: i64,
    referrer: Option<Referrer>,
    dtype: DType,
    shape: Vec<usize>,
    /// Stored flat positions, one per element of `shape`; `None` is the whole array
    flat: Option<Vec<usize>>,
}

impl<'db> ArrayView<'db> {
    /// View of a whole stored array
    pub(crate) fn load(db: &'db Database, id: i64, referrer: Option<Referrer>) -> Result<Self> {
        let shape = decode_shape(&db.load(Self::meta(db, id, SHAPE_KEY)?)?)?;
        let dtype = decode_dtype(&db.load(Self::meta(db, id, DTYPE_KEY)?)?)?;
        Ok(Self { db, id, referrer, dtype, shape, flat: None })
    }

    fn meta(db: &Database, id: i64, key: &str) -> Result<i64> {
        db.store()
            .child(id, &Slot::Key(key.to_string()))?
            .ok_or_else(|| Error::CorruptedState(format!("ndarray object {} has no {}", id, key)))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn size(&self) -> usize {
        size_of(&self.shape)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Whether this view covers the stored array exactly, in storage order
    pub fn is_base(&self) -> bool {
        self.flat.is_none()
    }

    // ========== Indexing ==========

    /// Element handle for a 0-d result, view otherwise
    pub fn get(&self, index: &[Index]) -> Result<Handle<'db>> {
        let (shape, flat) = self.select(index)?;
        if shape.is_empty() {
            let pos = flat.first().copied().ok_or_else(|| Error::Index("empty selection".to_string()))?;
            let referrer = Referrer::item(self.id, Slot::Ind(pos as i64));
            let child = self.child(pos)?;
            // object elements may themselves be containers
            return Ok(match self.db.handle(child, referrer.clone())? {
                Handle::Scalar(_) => Handle::Scalar(Scalar::with_dtype(self.db, referrer, self.dtype)),
                other => other,
            });
        }
        Ok(Handle::Array(self.derive(shape, flat)))
    }

    /// Always a view, even for a single element
    pub fn view(&self, index: &[Index]) -> Result<ArrayView<'db>> {
        let (shape, flat) = self.select(index)?;
        Ok(self.derive(shape, flat))
    }

    /// Assign `value` to the selected elements, broadcasting it to their shape
    pub fn set(&self, index: &[Index], value: impl Into<Value>) -> Result<()> {
        let (shape, flat) = self.select(index)?;
        let source = match value.into() {
            Value::Array(array) => array,
            nested @ (Value::List(_) | Value::Tuple(_)) => NdArray::from_nested(&nested)?,
            scalar => NdArray::scalar(scalar)?,
        };
        let data = source
            .broadcast_to(&shape)?
            .into_data()
            .iter()
            .map(|v| self.dtype.coerce(v))
            .collect::<Result<Vec<_>>>()?;

        self.db.mutate(|| {
            for (pos, value) in flat.iter().zip(&data) {
                self.db.rebind(&Referrer::item(self.id, Slot::Ind(*pos as i64)), value)?;
            }
            Ok(())
        })
    }

    /// Set every element of the view
    pub fn fill(&self, value: impl Into<Value>) -> Result<()> {
        self.set(&[Index::Ellipsis], value)
    }

    fn select(&self, index: &[Index]) -> Result<(Vec<usize>, Vec<usize>)> {
        let resolved = index::resolve(&self.shape, index, self.db.options().indexing_threshold)?;
        let flat = match &self.flat {
            Some(base) => resolved.flat.iter().map(|&i| base[i]).collect(),
            None => resolved.flat,
        };
        Ok((resolved.shape, flat))
    }

    fn derive(&self, shape: Vec<usize>, flat: Vec<usize>) -> ArrayView<'db> {
        ArrayView {
            db: self.db,
            id: self.id,
            referrer: None,
            dtype: self.dtype,
            shape,
            flat: Some(flat),
        }
    }

    fn positions(&self) -> Vec<usize> {
        match &self.flat {
            Some(flat) => flat.clone(),
            None => (0..self.size()).collect(),
        }
    }

    // ========== Reinterpretation ==========

    pub fn flatten(&self) -> ArrayView<'db> {
        self.derive(vec![self.size()], self.positions())
    }

    /// Drop every length-1 axis
    pub fn squeeze(&self) -> ArrayView<'db> {
        let shape = self.shape.iter().copied().filter(|&d| d != 1).collect();
        self.derive(shape, self.positions())
    }

    pub fn reshape(&self, shape: Vec<usize>) -> Result<ArrayView<'db>> {
        if size_of(&shape) != self.size() {
            return Err(Error::ShapeMismatch { from: self.shape.clone(), to: shape });
        }
        Ok(self.derive(shape, self.positions()))
    }

    // ========== Materialization ==========

    pub fn to_ndarray(&self) -> Result<NdArray> {
        let store = self.db.store();
        let data = match &self.flat {
            None => store
                .children(self.id)?
                .into_iter()
                .filter(|item| matches!(item.slot, Slot::Ind(_)))
                .map(|item| self.db.load(item.child_id))
                .collect::<Result<Vec<_>>>()?,
            Some(flat) => flat
                .iter()
                .map(|&pos| self.element(pos))
                .collect::<Result<Vec<_>>>()?,
        };
        NdArray::new(self.shape.clone(), self.dtype, data)
    }

    /// Nested lists of the selected elements
    pub fn tolist(&self) -> Result<Value> {
        Ok(self.to_ndarray()?.tolist())
    }

    fn element(&self, pos: usize) -> Result<Value> {
        self.db.load(self.child(pos)?)
    }

    fn child(&self, pos: usize) -> Result<i64> {
        self.db
            .store()
            .child(self.id, &Slot::Ind(pos as i64))?
            .ok_or_else(|| Error::CorruptedState(format!("ndarray object {} has no element {}", self.id, pos)))
    }

    // ========== Reductions ==========

    pub fn any(&self) -> Result<bool> {
        Ok(self.to_ndarray()?.data().iter().any(Value::truthy))
    }

    pub fn all(&self) -> Result<bool> {
        Ok(self.to_ndarray()?.data().iter().all(Value::truthy))
    }

    /// Sum of the elements; bools count as integers
    pub fn sum(&self) -> Result<Value> {
        let zero = match self.dtype {
            DType::Float64 => Value::Float(0.0),
            _ => Value::Int(0),
        };
        self.to_ndarray()?
            .data()
            .iter()
            .try_fold(zero, |acc, v| acc.add(v))
    }
}

impl<'db> Stored<'db> for ArrayView<'db> {
    fn db(&self) -> &'db Database {
        self.db
    }

    fn referrer(&self) -> Option<&Referrer> {
        self.referrer.as_ref()
    }

    fn id(&self) -> Result<i64> {
        Ok(self.id)
    }

    fn value(&self) -> Result<Value> {
        self.to_ndarray().map(Value::Array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid<'db>(db: &'db Database, rows: usize, cols: usize) -> ArrayView<'db> {
        let array = NdArray::arange(rows * cols).reshape(vec![rows, cols]).unwrap();
        db.set("a", array).unwrap();
        db.get("a").unwrap().into_array().unwrap()
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&v| Value::Int(v)).collect()
    }

    #[test]
    fn test_metadata() {
        let db = Database::open_in_memory().unwrap();
        let a = grid(&db, 2, 3);
        assert_eq!(a.shape(), &[2, 3]);
        assert_eq!(a.ndim(), 2);
        assert_eq!(a.size(), 6);
        assert_eq!(a.dtype(), DType::Int64);
        assert!(a.is_base());
    }

    #[test]
    fn test_element_and_row_access() {
        let db = Database::open_in_memory().unwrap();
        let a = grid(&db, 3, 4);

        let element = a.get(&[Index::Int(1), Index::Int(-1)]).unwrap().into_scalar().unwrap();
        assert_eq!(element.as_i64().unwrap(), 7);

        let row = a.view(&[Index::Int(2)]).unwrap();
        assert_eq!(row.shape(), &[4]);
        assert_eq!(row.to_ndarray().unwrap().data(), ints(&[8, 9, 10, 11]).as_slice());

        let column = a.view(&[Index::full(), Index::Int(1)]).unwrap();
        assert_eq!(column.tolist().unwrap(), Value::from(vec![1, 5, 9]));

        assert!(matches!(a.get(&[Index::Int(3)]), Err(Error::Index(_))));
    }

    #[test]
    fn test_views_compose() {
        let db = Database::open_in_memory().unwrap();
        let a = grid(&db, 4, 4);

        let inner = a.view(&[Index::slice(Some(1), Some(3), None), Index::slice(Some(1), Some(3), None)]).unwrap();
        assert_eq!(inner.tolist().unwrap(), Value::List(vec![vec![5, 6].into(), vec![9, 10].into()]));

        let corner = inner.get(&[Index::Int(1), Index::Int(1)]).unwrap();
        assert_eq!(corner.value().unwrap(), Value::Int(10));

        let flipped = inner.view(&[Index::slice(None, None, Some(-1))]).unwrap();
        assert_eq!(flipped.tolist().unwrap(), Value::List(vec![vec![9, 10].into(), vec![5, 6].into()]));
    }

    #[test]
    fn test_fancy_and_mask() {
        let db = Database::open_in_memory().unwrap();
        let a = grid(&db, 3, 3);

        let picked = a.view(&[Index::list([0, 2]), Index::list([2, 0])]).unwrap();
        assert_eq!(picked.tolist().unwrap(), Value::from(vec![2, 6]));

        let masked = a.view(&[Index::Mask(vec![true, false, true])]).unwrap();
        assert_eq!(masked.shape(), &[2, 3]);

        let expanded = a.view(&[Index::NewAxis, Index::Int(0)]).unwrap();
        assert_eq!(expanded.shape(), &[1, 3]);
    }

    #[test]
    fn test_set_broadcasts() {
        let db = Database::open_in_memory().unwrap();
        let a = grid(&db, 2, 3);

        a.set(&[Index::full(), Index::Int(0)], 100).unwrap();
        a.set(&[Index::Int(1)], vec![7, 8, 9]).unwrap();
        assert_eq!(
            a.tolist().unwrap(),
            Value::List(vec![vec![100, 1, 2].into(), vec![7, 8, 9].into()])
        );

        let err = a.set(&[Index::Int(0)], vec![1, 2]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert!(matches!(a.set(&[Index::Int(0)], "x"), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_set_coerces_to_dtype() {
        let db = Database::open_in_memory().unwrap();
        let a = grid(&db, 1, 2);
        a.set(&[Index::Int(0), Index::Int(0)], 2.9).unwrap();
        assert_eq!(a.tolist().unwrap(), Value::List(vec![vec![2, 1].into()]));

        let element = a.get(&[Index::Int(0), Index::Int(1)]).unwrap().into_scalar().unwrap();
        element.set(true).unwrap();
        assert_eq!(element.value().unwrap(), Value::Int(1));
    }

    #[test]
    fn test_set_through_view_writes_parent() {
        let db = Database::open_in_memory().unwrap();
        let a = grid(&db, 3, 3);
        let diagonal = a.view(&[Index::list([0, 1, 2]), Index::list([0, 1, 2])]).unwrap();
        diagonal.fill(-1).unwrap();

        let Value::Array(stored) = db.value("a").unwrap() else {
            panic!("expected an array");
        };
        assert_eq!(stored.get(&[1, 1]), Some(&Value::Int(-1)));
        assert_eq!(stored.get(&[0, 1]), Some(&Value::Int(1)));
        assert_eq!(stored.shape(), &[3, 3]);
    }

    #[test]
    fn test_reinterpretation_does_not_write() {
        let db = Database::open_in_memory().unwrap();
        let a = grid(&db, 2, 3);
        let before = db.stats().unwrap();

        assert_eq!(a.flatten().shape(), &[6]);
        assert_eq!(a.reshape(vec![3, 1, 2]).unwrap().squeeze().shape(), &[3, 2]);
        assert!(matches!(a.reshape(vec![4]), Err(Error::ShapeMismatch { .. })));
        assert_eq!(
            a.reshape(vec![3, 2]).unwrap().tolist().unwrap(),
            Value::List(vec![vec![0, 1].into(), vec![2, 3].into(), vec![4, 5].into()])
        );
        assert_eq!(db.stats().unwrap(), before);
    }

    #[test]
    fn test_reductions() {
        let db = Database::open_in_memory().unwrap();
        let a = grid(&db, 2, 2);
        assert_eq!(a.sum().unwrap(), Value::Int(6));
        assert!(a.any().unwrap());
        assert!(!a.all().unwrap());

        db.set("f", NdArray::from_vec(vec![Value::Float(0.5), Value::Float(1.0)]).unwrap()).unwrap();
        let f = db.get("f").unwrap().into_array().unwrap();
        assert_eq!(f.sum().unwrap(), Value::Float(1.5));
        assert!(f.all().unwrap());
    }

    #[test]
    fn test_analytic_strategy_above_threshold() {
        let options = crate::config::Options { indexing_threshold: 4, ..Default::default() };
        let db = Database::open_in_memory_with(options).unwrap();
        let a = grid(&db, 3, 3);

        let view = a.view(&[Index::slice(None, None, Some(2)), Index::Int(-1)]).unwrap();
        assert_eq!(view.tolist().unwrap(), Value::from(vec![2, 8]));
        // fancy indices always go through the materialized grid
        let picked = a.view(&[Index::list([2])]).unwrap();
        assert_eq!(picked.shape(), &[1, 3]);
    }

    #[test]
    fn test_element_handles_cannot_be_deleted() {
        let db = Database::open_in_memory().unwrap();
        let a = grid(&db, 2, 3);
        let element = a.get(&[Index::Int(0), Index::Int(1)]).unwrap();

        assert!(matches!(element.delete(), Err(Error::TypeMismatch(_))));
        assert_eq!(a.tolist().unwrap(), Value::List(vec![vec![0, 1, 2].into(), vec![3, 4, 5].into()]));
        assert!(db.check().unwrap().is_clean());
    }

    #[test]
    fn test_object_elements_keep_their_kind() {
        let db = Database::open_in_memory().unwrap();
        let array = NdArray::from_vec(vec![Value::from(vec![1, 2]), Value::Int(3)]).unwrap();
        assert_eq!(array.dtype(), DType::Object);
        db.set("o", array).unwrap();
        let o = db.get("o").unwrap().into_array().unwrap();

        let inner = o.get(&[Index::Int(0)]).unwrap().into_sequence().unwrap();
        inner.append(5).unwrap();
        assert_eq!(o.get(&[Index::Int(0)]).unwrap().value().unwrap(), Value::from(vec![1, 2, 5]));
        assert!(matches!(Stored::delete(&inner), Err(Error::TypeMismatch(_))));

        let scalar = o.get(&[Index::Int(1)]).unwrap().into_scalar().unwrap();
        assert_eq!(scalar.dtype(), Some(DType::Object));
        assert!(db.check().unwrap().is_clean());
    }

    #[test]
    fn test_derived_view_cannot_be_deleted() {
        let db = Database::open_in_memory().unwrap();
        let a = grid(&db, 2, 2);
        let row = a.view(&[Index::Int(0)]).unwrap();
        assert!(matches!(Stored::delete(&row), Err(Error::TypeMismatch(_))));

        Stored::delete(&a).unwrap();
        assert_eq!(db.stats().unwrap().objects, 0);
    }
}
