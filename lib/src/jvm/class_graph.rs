//! Class hierarchy used to join reference types

use super::{ArrayType, BinaryName, ClassFile, Error, Name, RefType};
use elsa::map::FrozenMap;
use std::collections::HashMap;
use std::fmt;
use typed_arena::Arena;

pub struct ClassGraphArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            class_arena: Arena::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        ClassGraphArenas::new()
    }
}

/// Tracks the superclass relationships between classes and interfaces
///
/// The graph only ever grows, and it can grow while being shared: classes which are mentioned in
/// the bytecode but which were never declared get registered on first use.
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    classes: FrozenMap<BinaryName, Box<&'g ClassData<'g>>>,
}

impl<'g> ClassGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Self {
        ClassGraph {
            arenas,
            classes: FrozenMap::new(),
        }
    }

    pub fn lookup_class(&self, name: &BinaryName) -> Option<&'g ClassData<'g>> {
        self.classes.get(name).copied()
    }

    /// Add a new class to the class graph
    ///
    /// If a class with the same name is already present, that class is returned instead.
    pub fn add_class(&self, data: ClassData<'g>) -> &'g ClassData<'g> {
        if let Some(existing) = self.lookup_class(&data.name) {
            return existing;
        }
        let data = &*self.arenas.class_arena.alloc(data);
        self.classes.insert(data.name.clone(), Box::new(data));
        data
    }

    /// Get a class, registering it as a direct subclass of `java/lang/Object` if it is unknown
    pub fn lookup_or_insert(&self, name: &BinaryName) -> &'g ClassData<'g> {
        if let Some(class) = self.lookup_class(name) {
            return class;
        }
        if name == &BinaryName::OBJECT {
            return self.add_class(ClassData::root());
        }
        log::trace!("Registering unknown class {} under {}", name, BinaryName::OBJECT);
        let object = self.lookup_or_insert(&BinaryName::OBJECT);
        self.add_class(ClassData::new(name.clone(), object, false))
    }

    /// Add standard types to the class graph
    pub fn insert_java_library_types(&self) {
        let object = self.lookup_or_insert(&BinaryName::OBJECT);

        for interface in [
            BinaryName::CHARSEQUENCE,
            BinaryName::CLONEABLE,
            BinaryName::COMPARABLE,
            BinaryName::SERIALIZABLE,
        ] {
            self.add_class(ClassData::new(interface, object, true));
        }

        for class in [
            BinaryName::STRING,
            BinaryName::STRINGBUILDER,
            BinaryName::CLASS,
            BinaryName::METHODHANDLE,
            BinaryName::METHODTYPE,
        ] {
            self.add_class(ClassData::new(class, object, false));
        }

        let number = self.add_class(ClassData::new(BinaryName::NUMBER, object, false));
        for boxed in [
            BinaryName::INTEGER,
            BinaryName::LONG,
            BinaryName::FLOAT,
            BinaryName::DOUBLE,
        ] {
            self.add_class(ClassData::new(boxed, number, false));
        }
        self.add_class(ClassData::new(BinaryName::BOOLEAN, object, false));

        let throwable = self.add_class(ClassData::new(BinaryName::THROWABLE, object, false));
        self.add_class(ClassData::new(BinaryName::ERROR, throwable, false));
        let exception = self.add_class(ClassData::new(BinaryName::EXCEPTION, throwable, false));
        let runtime_exception = self.add_class(ClassData::new(
            BinaryName::RUNTIMEEXCEPTION,
            exception,
            false,
        ));
        for unchecked in [
            BinaryName::ARITHMETICEXCEPTION,
            BinaryName::ILLEGALARGUMENTEXCEPTION,
            BinaryName::ILLEGALSTATEEXCEPTION,
            BinaryName::NULLPOINTEREXCEPTION,
        ] {
            self.add_class(ClassData::new(unchecked, runtime_exception, false));
        }
    }

    /// Add classes declared together (eg. all the class files passed to one invocation)
    ///
    /// Superclasses are inserted before their subclasses, regardless of declaration order. A
    /// class whose superclass chain loops back on itself is attached to `java/lang/Object`.
    pub fn insert_declared_classes(&self, declared: &[DeclaredClass]) {
        let by_name: HashMap<&BinaryName, &DeclaredClass> =
            declared.iter().map(|class| (&class.name, class)).collect();
        for class in declared {
            let mut in_progress = vec![];
            self.insert_declared(class, &by_name, &mut in_progress);
        }
    }

    fn insert_declared(
        &self,
        class: &DeclaredClass,
        by_name: &HashMap<&BinaryName, &DeclaredClass>,
        in_progress: &mut Vec<BinaryName>,
    ) -> &'g ClassData<'g> {
        if let Some(existing) = self.lookup_class(&class.name) {
            return existing;
        }
        let superclass = match &class.superclass {
            None => None,
            Some(name) if in_progress.contains(name) || name == &class.name => {
                log::warn!("Cyclic superclass chain through {}", class.name);
                Some(self.lookup_or_insert(&BinaryName::OBJECT))
            }
            Some(name) => Some(match by_name.get(name) {
                Some(superclass) => {
                    in_progress.push(class.name.clone());
                    let superclass = self.insert_declared(superclass, by_name, in_progress);
                    in_progress.pop();
                    superclass
                }
                None => self.lookup_or_insert(name),
            }),
        };
        self.add_class(ClassData {
            name: class.name.clone(),
            superclass,
            is_interface: class.is_interface,
        })
    }
}

/// Class hierarchy information extracted from a class file before it goes into the graph
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DeclaredClass {
    pub name: BinaryName,
    pub superclass: Option<BinaryName>,
    pub is_interface: bool,
}

impl DeclaredClass {
    pub fn new(name: &str, superclass: Option<&str>, is_interface: bool) -> Result<Self, Error> {
        let to_name =
            |name: &str| BinaryName::from_string(name.to_owned()).map_err(Error::MalformedName);
        Ok(DeclaredClass {
            name: to_name(name)?,
            superclass: superclass.map(to_name).transpose()?,
            is_interface,
        })
    }

    pub fn from_class_file(class_file: &ClassFile) -> Result<Self, Error> {
        Ok(DeclaredClass {
            name: class_file.class_name()?,
            superclass: class_file.super_class_name()?,
            is_interface: class_file.is_interface(),
        })
    }
}

pub struct ClassData<'g> {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<&'g ClassData<'g>>,

    /// Is this an interface?
    pub is_interface: bool,
}

impl<'g> ClassData<'g> {
    pub fn new(name: BinaryName, superclass: &'g ClassData<'g>, is_interface: bool) -> Self {
        ClassData {
            name,
            superclass: Some(superclass),
            is_interface,
        }
    }

    fn root() -> Self {
        ClassData {
            name: BinaryName::OBJECT,
            superclass: None,
            is_interface: false,
        }
    }

    /// Is this class the same as, or a (transitive) subclass of, the other class?
    pub fn is_subclass_of(&self, other: &ClassData<'g>) -> bool {
        let mut next_class = Some(self);
        while let Some(class) = next_class {
            if class == other {
                return true;
            }
            next_class = class.superclass;
        }
        false
    }
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> fmt::Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

/// Most specific common supertype of two reference types
///
/// Implementations must be total, deterministic, and symmetric, and joining a type with itself
/// must produce that same type.
pub trait LeastUpperBound {
    fn least_upper_bound(&self, a: &RefType<BinaryName>, b: &RefType<BinaryName>)
        -> RefType<BinaryName>;
}

impl<'g> LeastUpperBound for ClassGraph<'g> {
    fn least_upper_bound(
        &self,
        a: &RefType<BinaryName>,
        b: &RefType<BinaryName>,
    ) -> RefType<BinaryName> {
        if a == b {
            return a.clone();
        }
        match (a, b) {
            (RefType::Object(class1), RefType::Object(class2)) => {
                RefType::Object(self.class_least_upper_bound(class1, class2))
            }
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2))
                if arr1.additional_dimensions == arr2.additional_dimensions =>
            {
                RefType::ObjectArray(ArrayType {
                    additional_dimensions: arr1.additional_dimensions,
                    element_type: self
                        .class_least_upper_bound(&arr1.element_type, &arr2.element_type),
                })
            }
            _ => RefType::Object(BinaryName::OBJECT),
        }
    }
}

impl<'g> ClassGraph<'g> {
    /// Interfaces don't form a tree, so anything involving them joins to `java/lang/Object`
    fn class_least_upper_bound(&self, name1: &BinaryName, name2: &BinaryName) -> BinaryName {
        if name1 == name2 {
            return name1.clone();
        }
        let class1 = self.lookup_or_insert(name1);
        let class2 = self.lookup_or_insert(name2);
        if class1.is_interface || class2.is_interface {
            return BinaryName::OBJECT;
        }

        let mut candidate = Some(class1);
        while let Some(class) = candidate {
            if class2.is_subclass_of(class) {
                return class.name.clone();
            }
            candidate = class.superclass;
        }
        BinaryName::OBJECT
    }
}
