//! Initial data providers and codecs for data states.

use super::Channel;
use crate::core::{Payload, StateError, StateKey};
use crate::data::cell::{downcast_cell, is_cell_of, new_cell, DataCell};
use crate::data::{DataError, DataValue, StateData};
use crate::engine::TransitionRequest;
use futures_util::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// Result of computing a data state's initial value.
#[derive(Debug)]
pub enum InitialValue<D> {
    /// Enter the state with this value
    Value(D),

    /// Do not enter the state; transition elsewhere instead
    Redirect(TransitionRequest),
}

impl<D> From<D> for InitialValue<D> {
    fn from(value: D) -> Self {
        InitialValue::Value(value)
    }
}

/// Inputs available while computing initial data.
#[derive(Clone)]
pub struct InitialDataSource {
    key: StateKey,
    payload: Option<Payload>,
    ancestors: Vec<DataCell>,
}

impl InitialDataSource {
    pub(crate) fn new(key: StateKey, payload: Option<Payload>, ancestors: Vec<DataCell>) -> Self {
        Self {
            key,
            payload,
            ancestors,
        }
    }

    /// Key of the state being entered.
    pub fn key(&self) -> &StateKey {
        &self.key
    }

    /// Payload of the transition entering the state.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn payload_as<P: Any>(&self) -> Option<&P> {
        self.payload.as_ref()?.downcast_ref()
    }

    /// Payload carried through `channel`.
    pub fn channel_payload<P: Any + Send + Sync>(&self, channel: &Channel<P>) -> Result<&P, StateError> {
        channel.extract(&self.key, self.payload.as_ref())
    }

    /// Data of an active ancestor, by key.
    pub fn ancestor<A: StateData>(
        &self,
        key: impl Into<StateKey>,
    ) -> Result<Arc<DataValue<A>>, DataError> {
        let key = key.into();
        let cell = self
            .ancestors
            .iter()
            .find(|cell| cell.key() == &key)
            .ok_or(DataError::NotActive { key })?;
        downcast_cell(cell)
    }

    /// Data of the nearest active ancestor carrying an `A`.
    pub fn ancestor_of_type<A: StateData>(&self) -> Result<Arc<DataValue<A>>, DataError> {
        let cell = self
            .ancestors
            .iter()
            .find(|cell| is_cell_of::<A>(cell))
            .ok_or(DataError::NotFound {
                expected: std::any::type_name::<A>(),
            })?;
        downcast_cell(cell)
    }
}

type InitialFn<D> = Arc<
    dyn Fn(InitialDataSource) -> BoxFuture<'static, Result<InitialValue<D>, StateError>>
        + Send
        + Sync,
>;

/// Computes the value a data state starts with each time it is entered.
///
/// # Example
///
/// ```rust
/// use treestate::descriptor::{Channel, InitialData};
///
/// #[derive(Clone)]
/// struct Session { user: String }
///
/// let login: Channel<String> = Channel::new("session");
/// let initial = InitialData::from_channel(&login, |user: &String| Session { user: user.clone() });
/// ```
pub struct InitialData<D> {
    compute: InitialFn<D>,
}

impl<D> Clone for InitialData<D> {
    fn clone(&self) -> Self {
        Self {
            compute: Arc::clone(&self.compute),
        }
    }
}

impl<D: StateData> InitialData<D> {
    /// A fixed value, cloned on every entry.
    pub fn value(value: D) -> Self
    where
        D: Sync,
    {
        Self::from_fn(move || value.clone())
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> D + Send + Sync + 'static,
    {
        Self::computed(move |_| Ok(InitialValue::Value(f())))
    }

    /// Computed from the payload of the transition that entered through
    /// `channel`. Entering without that payload fails.
    pub fn from_channel<P, F>(channel: &Channel<P>, f: F) -> Self
    where
        P: Any + Send + Sync,
        F: Fn(&P) -> D + Send + Sync + 'static,
    {
        let channel = channel.clone();
        Self::computed(move |source| {
            let payload = source.channel_payload(&channel)?;
            Ok(InitialValue::Value(f(payload)))
        })
    }

    /// Computed from the current data of the ancestor `key`.
    pub fn from_ancestor<A, F>(key: impl Into<StateKey>, f: F) -> Self
    where
        A: StateData,
        F: Fn(&A) -> D + Send + Sync + 'static,
    {
        let key = key.into();
        Self::computed(move |source| {
            let ancestor = source.ancestor::<A>(key.clone())?;
            Ok(InitialValue::Value(ancestor.with(|a| f(a))?))
        })
    }

    /// Computed from the nearest ancestor carrying an `A`.
    pub fn from_ancestor_type<A, F>(f: F) -> Self
    where
        A: StateData,
        F: Fn(&A) -> D + Send + Sync + 'static,
    {
        Self::computed(move |source| {
            let ancestor = source.ancestor_of_type::<A>()?;
            Ok(InitialValue::Value(ancestor.with(|a| f(a))?))
        })
    }

    pub fn from_channel_and_ancestor<P, A, F>(
        channel: &Channel<P>,
        ancestor: impl Into<StateKey>,
        f: F,
    ) -> Self
    where
        P: Any + Send + Sync,
        A: StateData,
        F: Fn(&P, &A) -> D + Send + Sync + 'static,
    {
        let channel = channel.clone();
        let key = ancestor.into();
        Self::computed(move |source| {
            let payload = source.channel_payload(&channel)?;
            let ancestor = source.ancestor::<A>(key.clone())?;
            Ok(InitialValue::Value(ancestor.with(|a| f(payload, a))?))
        })
    }

    /// Fully general synchronous provider. May redirect instead of
    /// producing a value.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&InitialDataSource) -> Result<InitialValue<D>, StateError> + Send + Sync + 'static,
    {
        Self {
            compute: Arc::new(move |source| future::ready(f(&source)).boxed()),
        }
    }

    /// Fully general asynchronous provider.
    pub fn computed_async<F, Fut>(f: F) -> Self
    where
        F: Fn(InitialDataSource) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<InitialValue<D>, StateError>> + Send + 'static,
    {
        Self {
            compute: Arc::new(move |source| f(source).boxed()),
        }
    }

    pub(crate) fn compute(
        &self,
        source: InitialDataSource,
    ) -> BoxFuture<'static, Result<InitialValue<D>, StateError>> {
        (self.compute)(source)
    }
}

type EncodeFn<D> = Arc<dyn Fn(&D) -> Result<serde_json::Value, String> + Send + Sync>;
type DecodeFn<D> = Arc<dyn Fn(&serde_json::Value) -> Result<D, String> + Send + Sync>;

/// Converts a data state's value to and from its saved form.
pub struct DataCodec<D> {
    encode: EncodeFn<D>,
    decode: DecodeFn<D>,
}

impl<D> Clone for DataCodec<D> {
    fn clone(&self) -> Self {
        Self {
            encode: Arc::clone(&self.encode),
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<D: 'static> DataCodec<D> {
    pub fn new<E, F>(encode: E, decode: F) -> Self
    where
        E: Fn(&D) -> Result<serde_json::Value, String> + Send + Sync + 'static,
        F: Fn(&serde_json::Value) -> Result<D, String> + Send + Sync + 'static,
    {
        Self {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    /// Codec backed by the value's serde implementation.
    pub fn json() -> Self
    where
        D: Serialize + DeserializeOwned,
    {
        Self::new(
            |value| serde_json::to_value(value).map_err(|e| e.to_string()),
            |json| serde_json::from_value(json.clone()).map_err(|e| e.to_string()),
        )
    }
}

/// Outcome of computing a type-erased initial value.
pub(crate) enum InitialCell {
    Cell(DataCell),
    Redirect(TransitionRequest),
}

/// Type-erased data declaration of a node.
pub(crate) trait DataBinding: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn initial(&self, source: InitialDataSource) -> BoxFuture<'static, Result<InitialCell, StateError>>;

    fn has_codec(&self) -> bool;

    /// `None` when the binding has no codec.
    fn encode(&self, cell: &DataCell) -> Option<Result<serde_json::Value, String>>;

    fn decode(&self, key: &StateKey, json: &serde_json::Value) -> Option<Result<DataCell, String>>;
}

pub(crate) struct TypedBinding<D> {
    initial: InitialData<D>,
    codec: Option<DataCodec<D>>,
}

impl<D: StateData> TypedBinding<D> {
    pub(crate) fn new(initial: InitialData<D>, codec: Option<DataCodec<D>>) -> Self {
        Self { initial, codec }
    }
}

impl<D: StateData> DataBinding for TypedBinding<D> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<D>()
    }

    fn initial(&self, source: InitialDataSource) -> BoxFuture<'static, Result<InitialCell, StateError>> {
        let key = source.key().clone();
        let value = self.initial.compute(source);
        async move {
            Ok(match value.await? {
                InitialValue::Value(value) => InitialCell::Cell(new_cell(key, value)),
                InitialValue::Redirect(request) => InitialCell::Redirect(request),
            })
        }
        .boxed()
    }

    fn has_codec(&self) -> bool {
        self.codec.is_some()
    }

    fn encode(&self, cell: &DataCell) -> Option<Result<serde_json::Value, String>> {
        let codec = self.codec.as_ref()?;
        let encoded = downcast_cell::<D>(cell)
            .and_then(|value| value.with(|v| (codec.encode)(v)))
            .map_err(|e| e.to_string())
            .and_then(|result| result);
        Some(encoded)
    }

    fn decode(&self, key: &StateKey, json: &serde_json::Value) -> Option<Result<DataCell, String>> {
        let codec = self.codec.as_ref()?;
        Some((codec.decode)(json).map(|value| new_cell(key.clone(), value)))
    }
}
