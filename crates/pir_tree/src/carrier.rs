//! Carriers: versioned snapshots of a declaration's mutable state.
//!
//! Every carrier has a [`CarrierHeader`] shared by all kinds and a
//! [`CarrierData`] variant holding only the fields of its declaration kind.
//! Carriers are generic over the reference type `R` so that the same shape
//! serves a live session (`R = DeclId`) and a cache payload
//! (`R = Signature`); [`Carrier::try_map_refs`] converts between the two.
//!
//! Bodies are held behind `Arc`: cloning a carrier for a new stage shares the
//! body until a lowering replaces it.

use crate::body::Body;
use crate::const_value::ConstValue;
use crate::decl::{DeclKind, Modality, Origin, Visibility};
use crate::ids::DeclId;
use crate::stage::Stage;
use crate::types::IrType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An annotation applied to a declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation<R> {
    /// The annotation class's constructor.
    pub constructor: R,
    /// Constant arguments in parameter order.
    pub arguments: Vec<ConstValue>,
}

/// Fields every carrier has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierHeader<R> {
    /// The stage at which this snapshot was taken.
    pub last_modified: Stage,
    /// The containing declaration, `None` for top-level declarations.
    pub parent: Option<R>,
    /// Where the declaration came from.
    pub origin: Origin,
    /// Annotations in source order.
    pub annotations: Vec<Annotation<R>>,
}

/// What kind of class a class declaration is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassKind {
    /// An ordinary class.
    Class,
    /// An interface.
    Interface,
    /// A singleton object.
    Object,
    /// An enum class.
    EnumClass,
    /// An annotation class.
    AnnotationClass,
}

/// Mutable state of a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionData<R> {
    /// The declared return type.
    pub return_type: IrType<R>,
    /// The `this` parameter of a member function.
    pub dispatch_receiver: Option<R>,
    /// The receiver parameter of an extension function.
    pub extension_receiver: Option<R>,
    /// The body; `None` for abstract, external or not-yet-lowered functions.
    pub body: Option<Arc<Body<R>>>,
    /// Declared visibility.
    pub visibility: Visibility,
    /// Declared modality.
    pub modality: Modality,
    /// Type parameters in declaration order.
    pub type_parameters: Vec<R>,
    /// Value parameters in declaration order.
    pub value_parameters: Vec<R>,
    /// The property this function is an accessor of.
    pub corresponding_property: Option<R>,
    /// Functions this one overrides.
    pub overridden: Vec<R>,
    /// Whether calls are inlined at the call site.
    pub is_inline: bool,
}

/// Mutable state of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyData<R> {
    /// The backing field, if the property has one.
    pub backing_field: Option<R>,
    /// The getter.
    pub getter: Option<R>,
    /// The setter, for mutable properties.
    pub setter: Option<R>,
    /// Declared visibility.
    pub visibility: Visibility,
    /// Declared modality.
    pub modality: Modality,
    /// Properties this one overrides.
    pub overridden: Vec<R>,
    /// Whether the property is mutable.
    pub is_var: bool,
}

/// Mutable state of a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassData<R> {
    /// What kind of class this is.
    pub class_kind: ClassKind,
    /// The implicit `this` value parameter.
    pub this_receiver: Option<R>,
    /// Declared visibility.
    pub visibility: Visibility,
    /// Declared modality.
    pub modality: Modality,
    /// Direct supertypes.
    pub super_types: Vec<IrType<R>>,
    /// Type parameters in declaration order.
    pub type_parameters: Vec<R>,
    /// Member declarations in declaration order.
    pub declarations: Vec<R>,
}

/// Mutable state of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldData<R> {
    /// The field's type.
    pub ty: IrType<R>,
    /// The initializer, if any.
    pub initializer: Option<Arc<Body<R>>>,
    /// The property this field backs.
    pub corresponding_property: Option<R>,
    /// Declared visibility.
    pub visibility: Visibility,
    /// Whether the field belongs to the class rather than its instances.
    pub is_static: bool,
    /// Whether the field is assigned exactly once.
    pub is_final: bool,
}

/// Mutable state of a constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructorData<R> {
    /// The constructed type.
    pub return_type: IrType<R>,
    /// The `this` parameter of an inner class constructor.
    pub dispatch_receiver: Option<R>,
    /// The body.
    pub body: Option<Arc<Body<R>>>,
    /// Declared visibility.
    pub visibility: Visibility,
    /// Type parameters in declaration order.
    pub type_parameters: Vec<R>,
    /// Value parameters in declaration order.
    pub value_parameters: Vec<R>,
    /// Whether this is the class's primary constructor.
    pub is_primary: bool,
}

/// Mutable state of a type parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParameterData<R> {
    /// Upper bounds.
    pub super_types: Vec<IrType<R>>,
}

/// Mutable state of a value parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueParameterData<R> {
    /// The parameter's type.
    pub ty: IrType<R>,
    /// The default value expression.
    pub default_value: Option<Arc<Body<R>>>,
    /// Element type when the parameter is a vararg.
    pub vararg_element_type: Option<IrType<R>>,
}

/// Mutable state of a type alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAliasData<R> {
    /// The aliased type.
    pub expanded: IrType<R>,
    /// Type parameters in declaration order.
    pub type_parameters: Vec<R>,
    /// Declared visibility.
    pub visibility: Visibility,
}

/// Mutable state of an enum entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumEntryData<R> {
    /// The anonymous subclass of an entry with a body.
    pub corresponding_class: Option<R>,
    /// The constructor call initializing the entry.
    pub initializer: Option<Arc<Body<R>>>,
}

/// Mutable state of an anonymous initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymousInitializerData<R> {
    /// The initializer body.
    pub body: Option<Arc<Body<R>>>,
}

/// Mutable state of a delegated local variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDelegatedPropertyData<R> {
    /// The variable's type.
    pub ty: IrType<R>,
    /// The getter.
    pub getter: Option<R>,
    /// The setter, for mutable variables.
    pub setter: Option<R>,
}

/// The kind-specific part of a carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CarrierData<R> {
    /// See [`FunctionData`].
    Function(FunctionData<R>),
    /// See [`PropertyData`].
    Property(PropertyData<R>),
    /// See [`ClassData`].
    Class(ClassData<R>),
    /// See [`FieldData`].
    Field(FieldData<R>),
    /// See [`ConstructorData`].
    Constructor(ConstructorData<R>),
    /// See [`TypeParameterData`].
    TypeParameter(TypeParameterData<R>),
    /// See [`ValueParameterData`].
    ValueParameter(ValueParameterData<R>),
    /// See [`TypeAliasData`].
    TypeAlias(TypeAliasData<R>),
    /// See [`EnumEntryData`].
    EnumEntry(EnumEntryData<R>),
    /// See [`AnonymousInitializerData`].
    AnonymousInitializer(AnonymousInitializerData<R>),
    /// See [`LocalDelegatedPropertyData`].
    LocalDelegatedProperty(LocalDelegatedPropertyData<R>),
    /// Error placeholders have no mutable state.
    Error,
}

type MapFn<'f, R, S, E> = dyn FnMut(&R) -> Result<S, E> + 'f;

fn map_opt<R, S, E>(r: &Option<R>, f: &mut MapFn<'_, R, S, E>) -> Result<Option<S>, E> {
    r.as_ref().map(|r| f(r)).transpose()
}

fn map_vec<R, S, E>(rs: &[R], f: &mut MapFn<'_, R, S, E>) -> Result<Vec<S>, E> {
    rs.iter().map(|r| f(r)).collect()
}

fn map_types<R, S, E>(tys: &[IrType<R>], f: &mut MapFn<'_, R, S, E>) -> Result<Vec<IrType<S>>, E> {
    tys.iter().map(|t| t.try_map_refs(f)).collect()
}

fn map_body<R, S, E>(
    body: &Option<Arc<Body<R>>>,
    f: &mut MapFn<'_, R, S, E>,
) -> Result<Option<Arc<Body<S>>>, E> {
    body.as_ref()
        .map(|b| b.try_map_refs(f).map(Arc::new))
        .transpose()
}

fn visit_opt<R>(r: &Option<R>, f: &mut dyn FnMut(&R)) {
    if let Some(r) = r {
        f(r);
    }
}

fn visit_body<R>(body: &Option<Arc<Body<R>>>, f: &mut dyn FnMut(&R)) {
    if let Some(b) = body {
        b.for_each_ref(f);
    }
}

impl<R> CarrierData<R> {
    /// The declaration kind this data belongs to.
    pub fn kind(&self) -> DeclKind {
        match self {
            CarrierData::Function(_) => DeclKind::Function,
            CarrierData::Property(_) => DeclKind::Property,
            CarrierData::Class(_) => DeclKind::Class,
            CarrierData::Field(_) => DeclKind::Field,
            CarrierData::Constructor(_) => DeclKind::Constructor,
            CarrierData::TypeParameter(_) => DeclKind::TypeParameter,
            CarrierData::ValueParameter(_) => DeclKind::ValueParameter,
            CarrierData::TypeAlias(_) => DeclKind::TypeAlias,
            CarrierData::EnumEntry(_) => DeclKind::EnumEntry,
            CarrierData::AnonymousInitializer(_) => DeclKind::AnonymousInitializer,
            CarrierData::LocalDelegatedProperty(_) => DeclKind::LocalDelegatedProperty,
            CarrierData::Error => DeclKind::Error,
        }
    }

    /// Initial state of a freshly created declaration of `kind`: no body, no
    /// members, public and final, types left as [`IrType::Error`] until the
    /// producer fills them in.
    pub fn empty(kind: DeclKind) -> Self {
        match kind {
            DeclKind::Function => CarrierData::Function(FunctionData {
                return_type: IrType::unit(),
                dispatch_receiver: None,
                extension_receiver: None,
                body: None,
                visibility: Visibility::Public,
                modality: Modality::Final,
                type_parameters: Vec::new(),
                value_parameters: Vec::new(),
                corresponding_property: None,
                overridden: Vec::new(),
                is_inline: false,
            }),
            DeclKind::Property => CarrierData::Property(PropertyData {
                backing_field: None,
                getter: None,
                setter: None,
                visibility: Visibility::Public,
                modality: Modality::Final,
                overridden: Vec::new(),
                is_var: false,
            }),
            DeclKind::Class => CarrierData::Class(ClassData {
                class_kind: ClassKind::Class,
                this_receiver: None,
                visibility: Visibility::Public,
                modality: Modality::Final,
                super_types: Vec::new(),
                type_parameters: Vec::new(),
                declarations: Vec::new(),
            }),
            DeclKind::Field => CarrierData::Field(FieldData {
                ty: IrType::Error,
                initializer: None,
                corresponding_property: None,
                visibility: Visibility::Private,
                is_static: false,
                is_final: true,
            }),
            DeclKind::Constructor => CarrierData::Constructor(ConstructorData {
                return_type: IrType::Error,
                dispatch_receiver: None,
                body: None,
                visibility: Visibility::Public,
                type_parameters: Vec::new(),
                value_parameters: Vec::new(),
                is_primary: false,
            }),
            DeclKind::TypeParameter => CarrierData::TypeParameter(TypeParameterData {
                super_types: Vec::new(),
            }),
            DeclKind::ValueParameter => CarrierData::ValueParameter(ValueParameterData {
                ty: IrType::Error,
                default_value: None,
                vararg_element_type: None,
            }),
            DeclKind::TypeAlias => CarrierData::TypeAlias(TypeAliasData {
                expanded: IrType::Error,
                type_parameters: Vec::new(),
                visibility: Visibility::Public,
            }),
            DeclKind::EnumEntry => CarrierData::EnumEntry(EnumEntryData {
                corresponding_class: None,
                initializer: None,
            }),
            DeclKind::AnonymousInitializer => {
                CarrierData::AnonymousInitializer(AnonymousInitializerData { body: None })
            }
            DeclKind::LocalDelegatedProperty => {
                CarrierData::LocalDelegatedProperty(LocalDelegatedPropertyData {
                    ty: IrType::Error,
                    getter: None,
                    setter: None,
                })
            }
            DeclKind::Error => CarrierData::Error,
        }
    }

    /// The executable body of kinds that have one.
    pub fn body(&self) -> Option<&Arc<Body<R>>> {
        match self {
            CarrierData::Function(d) => d.body.as_ref(),
            CarrierData::Constructor(d) => d.body.as_ref(),
            CarrierData::AnonymousInitializer(d) => d.body.as_ref(),
            CarrierData::Field(d) => d.initializer.as_ref(),
            CarrierData::EnumEntry(d) => d.initializer.as_ref(),
            CarrierData::ValueParameter(d) => d.default_value.as_ref(),
            _ => None,
        }
    }

    /// Value parameters of callables, for signature computation.
    pub fn value_parameters(&self) -> &[R] {
        match self {
            CarrierData::Function(d) => &d.value_parameters,
            CarrierData::Constructor(d) => &d.value_parameters,
            _ => &[],
        }
    }

    /// Rebuilds this data with every declaration reference translated by `f`.
    pub fn try_map_refs<S, E>(
        &self,
        f: &mut dyn FnMut(&R) -> Result<S, E>,
    ) -> Result<CarrierData<S>, E> {
        Ok(match self {
            CarrierData::Function(d) => CarrierData::Function(FunctionData {
                return_type: d.return_type.try_map_refs(f)?,
                dispatch_receiver: map_opt(&d.dispatch_receiver, f)?,
                extension_receiver: map_opt(&d.extension_receiver, f)?,
                body: map_body(&d.body, f)?,
                visibility: d.visibility,
                modality: d.modality,
                type_parameters: map_vec(&d.type_parameters, f)?,
                value_parameters: map_vec(&d.value_parameters, f)?,
                corresponding_property: map_opt(&d.corresponding_property, f)?,
                overridden: map_vec(&d.overridden, f)?,
                is_inline: d.is_inline,
            }),
            CarrierData::Property(d) => CarrierData::Property(PropertyData {
                backing_field: map_opt(&d.backing_field, f)?,
                getter: map_opt(&d.getter, f)?,
                setter: map_opt(&d.setter, f)?,
                visibility: d.visibility,
                modality: d.modality,
                overridden: map_vec(&d.overridden, f)?,
                is_var: d.is_var,
            }),
            CarrierData::Class(d) => CarrierData::Class(ClassData {
                class_kind: d.class_kind,
                this_receiver: map_opt(&d.this_receiver, f)?,
                visibility: d.visibility,
                modality: d.modality,
                super_types: map_types(&d.super_types, f)?,
                type_parameters: map_vec(&d.type_parameters, f)?,
                declarations: map_vec(&d.declarations, f)?,
            }),
            CarrierData::Field(d) => CarrierData::Field(FieldData {
                ty: d.ty.try_map_refs(f)?,
                initializer: map_body(&d.initializer, f)?,
                corresponding_property: map_opt(&d.corresponding_property, f)?,
                visibility: d.visibility,
                is_static: d.is_static,
                is_final: d.is_final,
            }),
            CarrierData::Constructor(d) => CarrierData::Constructor(ConstructorData {
                return_type: d.return_type.try_map_refs(f)?,
                dispatch_receiver: map_opt(&d.dispatch_receiver, f)?,
                body: map_body(&d.body, f)?,
                visibility: d.visibility,
                type_parameters: map_vec(&d.type_parameters, f)?,
                value_parameters: map_vec(&d.value_parameters, f)?,
                is_primary: d.is_primary,
            }),
            CarrierData::TypeParameter(d) => CarrierData::TypeParameter(TypeParameterData {
                super_types: map_types(&d.super_types, f)?,
            }),
            CarrierData::ValueParameter(d) => CarrierData::ValueParameter(ValueParameterData {
                ty: d.ty.try_map_refs(f)?,
                default_value: map_body(&d.default_value, f)?,
                vararg_element_type: d
                    .vararg_element_type
                    .as_ref()
                    .map(|t| t.try_map_refs(f))
                    .transpose()?,
            }),
            CarrierData::TypeAlias(d) => CarrierData::TypeAlias(TypeAliasData {
                expanded: d.expanded.try_map_refs(f)?,
                type_parameters: map_vec(&d.type_parameters, f)?,
                visibility: d.visibility,
            }),
            CarrierData::EnumEntry(d) => CarrierData::EnumEntry(EnumEntryData {
                corresponding_class: map_opt(&d.corresponding_class, f)?,
                initializer: map_body(&d.initializer, f)?,
            }),
            CarrierData::AnonymousInitializer(d) => {
                CarrierData::AnonymousInitializer(AnonymousInitializerData {
                    body: map_body(&d.body, f)?,
                })
            }
            CarrierData::LocalDelegatedProperty(d) => {
                CarrierData::LocalDelegatedProperty(LocalDelegatedPropertyData {
                    ty: d.ty.try_map_refs(f)?,
                    getter: map_opt(&d.getter, f)?,
                    setter: map_opt(&d.setter, f)?,
                })
            }
            CarrierData::Error => CarrierData::Error,
        })
    }

    /// Calls `f` on every declaration reference in this data.
    pub fn for_each_ref(&self, f: &mut dyn FnMut(&R)) {
        match self {
            CarrierData::Function(d) => {
                d.return_type.for_each_ref(f);
                visit_opt(&d.dispatch_receiver, f);
                visit_opt(&d.extension_receiver, f);
                visit_body(&d.body, f);
                d.type_parameters.iter().for_each(&mut *f);
                d.value_parameters.iter().for_each(&mut *f);
                visit_opt(&d.corresponding_property, f);
                d.overridden.iter().for_each(&mut *f);
            }
            CarrierData::Property(d) => {
                visit_opt(&d.backing_field, f);
                visit_opt(&d.getter, f);
                visit_opt(&d.setter, f);
                d.overridden.iter().for_each(&mut *f);
            }
            CarrierData::Class(d) => {
                visit_opt(&d.this_receiver, f);
                for t in &d.super_types {
                    t.for_each_ref(f);
                }
                d.type_parameters.iter().for_each(&mut *f);
                d.declarations.iter().for_each(&mut *f);
            }
            CarrierData::Field(d) => {
                d.ty.for_each_ref(f);
                visit_body(&d.initializer, f);
                visit_opt(&d.corresponding_property, f);
            }
            CarrierData::Constructor(d) => {
                d.return_type.for_each_ref(f);
                visit_opt(&d.dispatch_receiver, f);
                visit_body(&d.body, f);
                d.type_parameters.iter().for_each(&mut *f);
                d.value_parameters.iter().for_each(&mut *f);
            }
            CarrierData::TypeParameter(d) => {
                for t in &d.super_types {
                    t.for_each_ref(f);
                }
            }
            CarrierData::ValueParameter(d) => {
                d.ty.for_each_ref(f);
                visit_body(&d.default_value, f);
                if let Some(t) = &d.vararg_element_type {
                    t.for_each_ref(f);
                }
            }
            CarrierData::TypeAlias(d) => {
                d.expanded.for_each_ref(f);
                d.type_parameters.iter().for_each(&mut *f);
            }
            CarrierData::EnumEntry(d) => {
                visit_opt(&d.corresponding_class, f);
                visit_body(&d.initializer, f);
            }
            CarrierData::AnonymousInitializer(d) => visit_body(&d.body, f),
            CarrierData::LocalDelegatedProperty(d) => {
                d.ty.for_each_ref(f);
                visit_opt(&d.getter, f);
                visit_opt(&d.setter, f);
            }
            CarrierData::Error => {}
        }
    }
}

/// One snapshot of a declaration's mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Carrier<R = DeclId> {
    /// Fields shared by every kind.
    pub header: CarrierHeader<R>,
    /// Kind-specific fields.
    pub data: CarrierData<R>,
}

impl<R> Carrier<R> {
    /// Creates a top-level, source-defined carrier with no annotations.
    pub fn new(last_modified: Stage, data: CarrierData<R>) -> Self {
        Self {
            header: CarrierHeader {
                last_modified,
                parent: None,
                origin: Origin::Defined,
                annotations: Vec::new(),
            },
            data,
        }
    }

    /// Returns the same carrier with its parent set.
    pub fn with_parent(mut self, parent: R) -> Self {
        self.header.parent = Some(parent);
        self
    }

    /// The stage this snapshot was taken at.
    pub fn last_modified(&self) -> Stage {
        self.header.last_modified
    }

    /// The declaration kind this carrier belongs to.
    pub fn kind(&self) -> DeclKind {
        self.data.kind()
    }

    /// Rebuilds this carrier with every declaration reference translated by `f`.
    pub fn try_map_refs<S, E>(&self, f: &mut dyn FnMut(&R) -> Result<S, E>) -> Result<Carrier<S>, E> {
        Ok(Carrier {
            header: CarrierHeader {
                last_modified: self.header.last_modified,
                parent: map_opt(&self.header.parent, f)?,
                origin: self.header.origin.clone(),
                annotations: self
                    .header
                    .annotations
                    .iter()
                    .map(|a| {
                        Ok(Annotation {
                            constructor: f(&a.constructor)?,
                            arguments: a.arguments.clone(),
                        })
                    })
                    .collect::<Result<_, E>>()?,
            },
            data: self.data.try_map_refs(f)?,
        })
    }

    /// Calls `f` on every declaration reference in this carrier: the parent,
    /// annotations, then the kind-specific fields.
    pub fn for_each_ref(&self, f: &mut dyn FnMut(&R)) {
        visit_opt(&self.header.parent, f);
        for a in &self.header.annotations {
            f(&a.constructor);
        }
        self.data.for_each_ref(f);
    }
}
