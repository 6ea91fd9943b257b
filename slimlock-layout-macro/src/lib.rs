// https://github.com/rust-lang/rfcs/blob/master/text/2585-unsafe-block-in-unsafe-fn.md
#![deny(unsafe_op_in_unsafe_fn)]

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, GenericParam, Generics, Type, parse_quote};

/// Implement `slimlock_layout::ShareableLayout` for the annotated type.
/// Requires all fields to implement `ShareableLayout`.
///
/// An empty struct fails because Rust doesn't consider fieldless structs to
/// be FFI-safe:
/// ```compile_fail
/// use slimlock_layout::ShareableLayout;
///
/// #[derive(ShareableLayout)]
/// #[repr(C)]
/// struct Foo {}
/// ```
///
/// FFI-safe structs containing only `ShareableLayout` fields qualify:
/// ```
/// use slimlock_layout::ShareableLayout;
///
/// #[repr(C)]
/// #[derive(ShareableLayout)]
/// struct Foo {
///   x: i32,
/// }
/// ```
///
/// `#[repr(transparent)]` is OK too.
/// ```
/// use slimlock_layout::ShareableLayout;
///
/// #[repr(transparent)]
/// #[derive(ShareableLayout)]
/// struct Foo {
///   x: i32,
/// }
/// ```
///
/// A struct containing a *reference* doesn't qualify:
/// ```compile_fail
/// use slimlock_layout::ShareableLayout;
///
/// #[repr(C)]
/// #[derive(ShareableLayout)]
/// struct Foo<'a> {
///   x: &'a i32,
/// }
/// ```
///
/// A struct containing a [Box] doesn't qualify:
/// ```compile_fail
/// use slimlock_layout::ShareableLayout;
///
/// #[repr(C)]
/// #[derive(ShareableLayout)]
/// struct Foo {
///   x: Box<i32>,
/// }
/// ```
///
/// A field can be allow-listed with the attribute `unsafe_assume_shareable_layout`:
/// ```
/// use slimlock_layout::ShareableLayout;
///
/// #[repr(C)]
/// #[derive(ShareableLayout)]
/// struct Foo {
///   // SAFETY: we ensure the pointer isn't dereferenced
///   // outside of its original address space.
///   #[unsafe_assume_shareable_layout]
///   x: *const i32,
/// }
/// ```
///
/// A union containing only `ShareableLayout` fields qualifies:
/// ```
/// use slimlock_layout::ShareableLayout;
///
/// #[repr(C)]
/// #[derive(ShareableLayout)]
/// union Foo {
///   x: i32,
///   y: i32,
/// }
/// ```
///
/// An enum containing only `ShareableLayout` variants qualifies:
/// ```
/// use slimlock_layout::ShareableLayout;
///
/// #[repr(C)]
/// #[derive(ShareableLayout)]
/// enum Foo {
///   Bar(i32),
///   Baz(i32),
/// }
/// ```
///
/// An enum containing a non-qualifying variant doesn't qualify:
/// ```compile_fail
/// use slimlock_layout::ShareableLayout;
///
/// #[repr(C)]
/// #[derive(ShareableLayout)]
/// enum Foo {
///   Bar(i32),
///   Baz(*const i32),
/// }
/// ```
///
/// A generic type *conditionally* implements `ShareableLayout`, if its type
/// parameters do (as the derive macros in the std crate behave).
/// ```
/// use slimlock_layout::ShareableLayout;
///
/// #[repr(C)]
/// #[derive(ShareableLayout)]
/// struct Wrapper<T> {
///   val: T,
/// }
///
/// static_assertions::assert_impl_all!(Wrapper<i32>: slimlock_layout::ShareableLayout);
/// static_assertions::assert_not_impl_all!(Wrapper<*const i32>: slimlock_layout::ShareableLayout);
/// ```
#[proc_macro_derive(ShareableLayout, attributes(unsafe_assume_shareable_layout))]
pub fn derive_shareable_layout(tokens: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let ast = syn::parse(tokens).unwrap();
    impl_derive_shareable_layout(ast)
}

// Add a bound `T: ShareableLayout` to every type parameter T.
fn add_trait_bounds(mut generics: Generics) -> Generics {
    for param in &mut generics.params {
        if let GenericParam::Type(ref mut type_param) = *param {
            type_param
                .bounds
                .push(parse_quote!(slimlock_layout::ShareableLayout));
        }
    }
    generics
}

fn assume_shareable(attrs: &[Attribute]) -> bool {
    attrs
        .iter()
        .any(|attr| attr.path().is_ident("unsafe_assume_shareable_layout"))
}

fn impl_derive_shareable_layout(ast: syn::DeriveInput) -> proc_macro::TokenStream {
    let name = &ast.ident;
    // This generates calls to a function `check` that only accepts
    // `ShareableLayout` types, which is how we validate the fields.
    let types: Vec<&Type> = match &ast.data {
        syn::Data::Struct(s) => s
            .fields
            .iter()
            .filter(|field| !assume_shareable(&field.attrs))
            .map(|field| &field.ty)
            .collect(),
        syn::Data::Enum(e) => e
            .variants
            .iter()
            .flat_map(|variant| {
                variant
                    .fields
                    .iter()
                    .filter(|field| !assume_shareable(&field.attrs))
                    .map(|field| &field.ty)
            })
            .collect(),
        syn::Data::Union(u) => u
            .fields
            .named
            .iter()
            .filter(|field| !assume_shareable(&field.attrs))
            .map(|field| &field.ty)
            .collect(),
    };

    let calls_to_check: TokenStream = types
        .into_iter()
        .map(|ty| quote! { check::<#ty>(); })
        .collect();

    let generics = add_trait_bounds(ast.generics);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    quote! {
        unsafe impl #impl_generics ::slimlock_layout::ShareableLayout for #name #ty_generics #where_clause {
            const IGNORE: () = {
                const fn check<T: ::slimlock_layout::ShareableLayout>() {}
                #calls_to_check
            };
        }
        #[deny(improper_ctypes_definitions)]
        const _: () = {
            // Force compilation to fail if the type isn't FFI safe.
            extern "C" fn _slimlock_validate_ffi_safe #impl_generics (_: #name #ty_generics) #where_clause {}
        };
    }
    .into()
}
