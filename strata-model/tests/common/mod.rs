//! Shared test model: a zoo of enclosures holding animals.

#![allow(dead_code)]

use std::sync::OnceLock;

use strata_model::{Model, ObjectId, ObjectRef, TypeDescriptor, TypeRegistry};

#[derive(Default)]
pub struct Animal {
    pub name: String,
    pub legs: u8,
}

impl Model for Animal {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::builder::<Animal>("Animal")
                .value("name", |a| &a.name, |a| &mut a.name)
                .value("legs", |a| &a.legs, |a| &mut a.legs)
                .build()
        })
    }
}

#[derive(Default)]
pub struct Collar {
    pub tag: String,
    pub color: u32,
}

impl Model for Collar {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::builder::<Collar>("Collar")
                .value("tag", |c| &c.tag, |c| &mut c.tag)
                .value("color", |c| &c.color, |c| &mut c.color)
                .build()
        })
    }
}

#[derive(Default)]
pub struct Dog {
    pub name: String,
    pub legs: u8,
    pub tricks: Vec<String>,
    pub collar: Option<ObjectRef>,
}

impl Model for Dog {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::builder::<Dog>("Dog")
                .extends(Animal::type_descriptor)
                .value("name", |d| &d.name, |d| &mut d.name)
                .value("legs", |d| &d.legs, |d| &mut d.legs)
                .value_list("tricks", |d| &d.tricks, |d| &mut d.tricks)
                .owned_replaceable("collar", Collar::type_descriptor, |d| &d.collar, |d| &mut d.collar)
                .build()
        })
    }
}

pub struct Enclosure {
    pub label: String,
    pub weights: Vec<f64>,
    pub mascot: ObjectRef,
    pub residents: Vec<ObjectRef>,
    pub keeper: Option<ObjectId>,
    pub capacity: Option<u32>,
}

impl Default for Enclosure {
    fn default() -> Self {
        Self {
            label: String::new(),
            weights: Vec::new(),
            mascot: ObjectRef::new(Animal::default()),
            residents: Vec::new(),
            keeper: None,
            capacity: None,
        }
    }
}

impl Model for Enclosure {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::builder::<Enclosure>("Enclosure")
                .value("label", |e| &e.label, |e| &mut e.label)
                .value_list("weights", |e| &e.weights, |e| &mut e.weights)
                .owned("mascot", Animal::type_descriptor, |e| &e.mascot, |e| &mut e.mascot)
                .owned_list("residents", Animal::type_descriptor, |e| &e.residents, |e| &mut e.residents)
                .reference("keeper", |e| &e.keeper, |e| &mut e.keeper)
                .value("capacity", |e| &e.capacity, |e| &mut e.capacity)
                .build()
        })
    }
}

pub fn registry() -> TypeRegistry {
    TypeRegistry::builder()
        .register::<Animal>()
        .register::<Collar>()
        .register::<Dog>()
        .register::<Enclosure>()
        .build()
        .unwrap()
}

pub fn dog(name: &str, owner: &ObjectRef, tricks: &[&str]) -> ObjectRef {
    let dog = ObjectRef::with_owner(
        Dog {
            name: name.to_string(),
            legs: 4,
            tricks: tricks.iter().map(|t| t.to_string()).collect(),
            collar: None,
        },
        owner,
    );
    let collar = ObjectRef::with_owner(
        Collar {
            tag: format!("{name}-tag"),
            color: 0xff0000,
        },
        &dog,
    );
    dog.write_as::<Dog>().unwrap().collar = Some(collar);
    dog
}

pub fn animal(name: &str, legs: u8, owner: &ObjectRef) -> ObjectRef {
    ObjectRef::with_owner(
        Animal {
            name: name.to_string(),
            legs,
        },
        owner,
    )
}

/// An enclosure with a dog mascot, three residents and a keeper reference.
pub fn enclosure() -> ObjectRef {
    let enclosure = ObjectRef::new(Enclosure {
        label: "North".to_string(),
        weights: vec![0.1, 2.5e-8, 1234.5678],
        capacity: Some(12),
        ..Enclosure::default()
    });
    let mascot = dog("Rex", &enclosure, &["sit", "roll"]);
    let residents = vec![
        animal("Polly", 2, &enclosure),
        dog("Fido", &enclosure, &["fetch"]),
        animal("Slinky", 0, &enclosure),
    ];
    let mut e = enclosure.write_as::<Enclosure>().unwrap();
    e.mascot = mascot;
    e.keeper = Some(residents[1].id());
    e.residents = residents;
    drop(e);
    enclosure
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
