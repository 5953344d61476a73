//! Type-erased products and the handler registry that gives them behavior.
//!
//! Products travel through the core as [`ProductBox`]es. The only things the
//! core needs to know about a product are captured by [`EdProduct`]; merge
//! and equality behavior is looked up by [`TypeTag`] in [`ProductTypes`]
//! rather than carried by the product itself.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use crate::error::{TypeError, TypeResult};

/// Runtime identity of a concrete product type.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Compiler-provided type name. Informational only.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Capability interface over a stored product.
pub trait EdProduct: Any + Send + Sync + 'static {
    /// Tag of the wrapped user type.
    fn type_tag(&self) -> TypeTag;

    /// `false` for a placeholder written by a producer that made nothing.
    fn is_present(&self) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Owned, type-erased product.
pub type ProductBox = Box<dyn EdProduct>;

impl dyn EdProduct {
    pub fn wrapper<T: 'static>(&self) -> Option<&Wrapper<T>> {
        self.as_any().downcast_ref::<Wrapper<T>>()
    }

    /// The wrapped value, if this product holds a present `T`.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.wrapper::<T>().and_then(Wrapper::get)
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.as_any_mut()
            .downcast_mut::<Wrapper<T>>()
            .and_then(Wrapper::get_mut)
    }
}

impl fmt::Debug for dyn EdProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdProduct")
            .field("type", &self.type_tag().name())
            .field("present", &self.is_present())
            .finish()
    }
}

/// Standard [`EdProduct`] carrier for a user value.
#[derive(Clone, Debug, PartialEq)]
pub struct Wrapper<T> {
    obj: Option<T>,
}

impl<T> Wrapper<T> {
    pub fn new(obj: T) -> Self {
        Self { obj: Some(obj) }
    }

    /// A placeholder recording that the producer created nothing.
    pub fn absent() -> Self {
        Self { obj: None }
    }

    pub fn get(&self) -> Option<&T> {
        self.obj.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.obj.as_mut()
    }

    pub fn into_inner(self) -> Option<T> {
        self.obj
    }
}

impl<T: Send + Sync + 'static> Wrapper<T> {
    pub fn boxed(obj: T) -> ProductBox {
        Box::new(Self::new(obj))
    }
}

impl<T: Send + Sync + 'static> EdProduct for Wrapper<T> {
    fn type_tag(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn is_present(&self) -> bool {
        self.obj.is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

type MergeFn = dyn Fn(&mut dyn EdProduct, &dyn EdProduct) -> bool + Send + Sync;
type EqualFn = dyn Fn(&dyn EdProduct, &dyn EdProduct) -> Option<bool> + Send + Sync;

struct TypeHandler {
    friendly_name: String,
    merge: Option<Arc<MergeFn>>,
    equal: Option<Arc<EqualFn>>,
}

#[derive(Default)]
struct Tables {
    by_tag: HashMap<TypeTag, Arc<TypeHandler>>,
    by_name: HashMap<String, TypeTag>,
}

/// Job-wide registry binding product types to friendly names and to optional
/// merge and equality handlers.
///
/// A type must be registered before it can be queried by type or created in
/// a principal. Re-registering a type under the same name adds whichever
/// merge or equality handler it still lacks; handlers already present are
/// kept.
pub struct ProductTypes {
    tables: RwLock<Tables>,
}

impl ProductTypes {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Register `T` with no merge or equality behavior.
    pub fn register<T: Send + Sync + 'static>(&self, friendly_name: &str) -> TypeResult<TypeTag> {
        self.insert(
            TypeTag::of::<T>(),
            TypeHandler {
                friendly_name: friendly_name.to_string(),
                merge: None,
                equal: None,
            },
        )
    }

    /// Register `T` with a merge function used when run and subrun fragments
    /// are combined.
    pub fn register_mergeable<T, F>(&self, friendly_name: &str, merge: F) -> TypeResult<TypeTag>
    where
        T: Send + Sync + 'static,
        F: Fn(&mut T, &T) + Send + Sync + 'static,
    {
        let erased = move |dst: &mut dyn EdProduct, src: &dyn EdProduct| -> bool {
            match (dst.get_mut::<T>(), src.get::<T>()) {
                (Some(d), Some(s)) => {
                    merge(d, s);
                    true
                }
                _ => false,
            }
        };
        self.insert(
            TypeTag::of::<T>(),
            TypeHandler {
                friendly_name: friendly_name.to_string(),
                merge: Some(Arc::new(erased)),
                equal: None,
            },
        )
    }

    /// Register `T` with equality checking through its `PartialEq`.
    pub fn register_comparable<T>(&self, friendly_name: &str) -> TypeResult<TypeTag>
    where
        T: PartialEq + Send + Sync + 'static,
    {
        let erased = |a: &dyn EdProduct, b: &dyn EdProduct| -> Option<bool> {
            match (a.get::<T>(), b.get::<T>()) {
                (Some(x), Some(y)) => Some(x == y),
                _ => None,
            }
        };
        self.insert(
            TypeTag::of::<T>(),
            TypeHandler {
                friendly_name: friendly_name.to_string(),
                merge: None,
                equal: Some(Arc::new(erased)),
            },
        )
    }

    fn insert(&self, tag: TypeTag, handler: TypeHandler) -> TypeResult<TypeTag> {
        let mut tables = self.tables.write().expect("lock poisoned");
        if let Some(existing) = tables.by_tag.get(&tag) {
            if existing.friendly_name == handler.friendly_name {
                let combined = TypeHandler {
                    merge: existing.merge.clone().or(handler.merge),
                    equal: existing.equal.clone().or(handler.equal),
                    friendly_name: handler.friendly_name,
                };
                tables.by_tag.insert(tag, Arc::new(combined));
                return Ok(tag);
            }
            return Err(TypeError::DuplicateType {
                type_name: tag.name().to_string(),
                existing: existing.friendly_name.clone(),
            });
        }
        if let Some(other) = tables.by_name.get(&handler.friendly_name) {
            return Err(TypeError::DuplicateTypeName {
                name: handler.friendly_name,
                existing: other.name().to_string(),
            });
        }
        tables.by_name.insert(handler.friendly_name.clone(), tag);
        tables.by_tag.insert(tag, Arc::new(handler));
        Ok(tag)
    }

    fn handler(&self, tag: TypeTag) -> Option<Arc<TypeHandler>> {
        self.tables
            .read()
            .expect("lock poisoned")
            .by_tag
            .get(&tag)
            .cloned()
    }

    pub fn friendly_name(&self, tag: TypeTag) -> Option<String> {
        self.handler(tag).map(|h| h.friendly_name.clone())
    }

    pub fn friendly_name_of<T: 'static>(&self) -> Option<String> {
        self.friendly_name(TypeTag::of::<T>())
    }

    pub fn tag_for(&self, friendly_name: &str) -> Option<TypeTag> {
        self.tables
            .read()
            .expect("lock poisoned")
            .by_name
            .get(friendly_name)
            .copied()
    }

    pub fn is_registered(&self, tag: TypeTag) -> bool {
        self.handler(tag).is_some()
    }

    pub fn has_merge(&self, tag: TypeTag) -> bool {
        self.handler(tag).is_some_and(|h| h.merge.is_some())
    }

    pub fn has_equality(&self, tag: TypeTag) -> bool {
        self.handler(tag).is_some_and(|h| h.equal.is_some())
    }

    /// Merge `other` into `target`. Returns `false` when the type has no
    /// merge handler or either side holds no value.
    pub fn try_merge(&self, target: &mut dyn EdProduct, other: &dyn EdProduct) -> bool {
        match self.handler(target.type_tag()) {
            Some(h) => match &h.merge {
                Some(merge) => merge(target, other),
                None => false,
            },
            None => false,
        }
    }

    /// Compare two products. `None` when the type has no equality handler.
    pub fn try_equal(&self, a: &dyn EdProduct, b: &dyn EdProduct) -> Option<bool> {
        let h = self.handler(a.type_tag())?;
        let equal = h.equal.as_ref()?;
        equal(a, b)
    }

    pub fn len(&self) -> usize {
        self.tables.read().expect("lock poisoned").by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProductTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProductTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductTypes")
            .field("type_count", &self.len())
            .finish()
    }
}
