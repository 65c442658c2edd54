//! Type-erased handle to an active data value.

use super::{DataError, DataValue, StateData};
use crate::core::StateKey;
use std::any::{Any, TypeId};
use std::sync::Arc;

pub(crate) trait ErasedDataValue: Send + Sync {
    fn key(&self) -> &StateKey;
    fn value_type_id(&self) -> TypeId;
    fn value_type_name(&self) -> &'static str;
    fn close(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<D: StateData> ErasedDataValue for DataValue<D> {
    fn key(&self) -> &StateKey {
        DataValue::key(self)
    }

    fn value_type_id(&self) -> TypeId {
        TypeId::of::<D>()
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<D>()
    }

    fn close(&self) {
        DataValue::close(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub(crate) type DataCell = Arc<dyn ErasedDataValue>;

pub(crate) fn new_cell<D: StateData>(key: StateKey, value: D) -> DataCell {
    Arc::new(DataValue::new(key, value))
}

pub(crate) fn is_cell_of<D: StateData>(cell: &DataCell) -> bool {
    cell.value_type_id() == TypeId::of::<D>()
}

pub(crate) fn downcast_cell<D: StateData>(cell: &DataCell) -> Result<Arc<DataValue<D>>, DataError> {
    let mismatch = || DataError::TypeMismatch {
        key: cell.key().clone(),
        expected: std::any::type_name::<D>(),
        found: cell.value_type_name(),
    };
    if !is_cell_of::<D>(cell) {
        return Err(mismatch());
    }
    Arc::clone(cell)
        .into_any()
        .downcast::<DataValue<D>>()
        .map_err(|_| mismatch())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_checks_the_value_type() {
        let cell = new_cell(StateKey::new("volume"), 11u8);

        let typed = downcast_cell::<u8>(&cell).unwrap();
        assert_eq!(typed.value().unwrap(), 11);

        let error = downcast_cell::<String>(&cell).unwrap_err();
        assert!(matches!(error, DataError::TypeMismatch { found: "u8", .. }));
    }

    #[test]
    fn closing_through_the_erased_handle_closes_the_value() {
        let cell = new_cell(StateKey::new("volume"), 11u8);
        let typed = downcast_cell::<u8>(&cell).unwrap();
        cell.close();
        assert!(typed.is_closed());
    }
}
