//! Provides derive macros for `deploy::HasDependencies`.
use quote::quote;
use syn::{Data, DataStruct, DeriveInput, Fields};

fn dependency_exprs(input: &DeriveInput) -> syn::Result<Vec<proc_macro2::TokenStream>> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(DataStruct { fields, .. }) => fields,
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "deriving HasDependencies only supports structs, \
                 implement it by hand for enums"
                    .to_string(),
            ));
        }
    };

    let mut exprs = vec![];
    for (i, field) in fields.iter().enumerate() {
        let mut skip = false;
        for att in field.attrs.iter() {
            if att.path().is_ident("dependencies") {
                att.parse_nested_meta(|meta| {
                    if meta.path.is_ident("skip") {
                        skip = true;
                        Ok(())
                    } else {
                        Err(meta.error(format!(
                            "unsupported field attribute {:?} - must be 'skip'",
                            meta.path
                                .get_ident()
                                .map(|id| id.to_string())
                                .unwrap_or("unknown".to_string())
                        )))
                    }
                })?;
            }
        }
        if skip {
            continue;
        }
        let accessor = match (fields, &field.ident) {
            (Fields::Named(_), Some(ident)) => quote! { self.#ident },
            _ => {
                let index = syn::Index::from(i);
                quote! { self.#index }
            }
        };
        exprs.push(quote! {
            .merge(deploy::HasDependencies::dependencies(&#accessor))
        });
    }
    Ok(exprs)
}

/// Derives `deploy::HasDependencies` by merging the dependencies of every
/// field. Fields marked `#[dependencies(skip)]` are left out.
#[proc_macro_derive(HasDependencies, attributes(dependencies))]
pub fn derive_has_dependencies(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input: DeriveInput = syn::parse_macro_input!(input);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let exprs = match dependency_exprs(&input) {
        Ok(exprs) => exprs,
        Err(e) => return e.into_compile_error().into(),
    };

    let output = quote! {
        impl #impl_generics deploy::HasDependencies for #name #ty_generics #where_clause {
            fn dependencies(&self) -> deploy::Dependencies {
                deploy::Dependencies::default()
                    #(#exprs)*
            }
        }
    };
    output.into()
}
