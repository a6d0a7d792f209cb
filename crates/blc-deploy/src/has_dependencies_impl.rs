//! Implementations of HasDependencies for primitives and containers.

use crate::{Dependencies, HasDependencies};

macro_rules! go {
    ($type: ty) => {
        impl HasDependencies for $type {}
    };
}

go!(String);
go!(u8);
go!(u16);
go!(u32);
go!(u64);
go!(i32);
go!(i64);
go!(bool);

impl<T: HasDependencies> HasDependencies for Vec<T> {
    fn dependencies(&self) -> Dependencies {
        self.iter()
            .fold(Dependencies::default(), |acc, item| acc.merge(item.dependencies()))
    }
}

impl<K, V: HasDependencies> HasDependencies for std::collections::BTreeMap<K, V> {
    fn dependencies(&self) -> Dependencies {
        self.values()
            .fold(Dependencies::default(), |acc, item| acc.merge(item.dependencies()))
    }
}

impl<V: HasDependencies> HasDependencies for std::collections::BTreeSet<V> {
    fn dependencies(&self) -> Dependencies {
        self.iter()
            .fold(Dependencies::default(), |acc, item| acc.merge(item.dependencies()))
    }
}

impl<V: HasDependencies> HasDependencies for Option<V> {
    fn dependencies(&self) -> Dependencies {
        self.iter()
            .fold(Dependencies::default(), |acc, item| acc.merge(item.dependencies()))
    }
}
