//! Compiles a few location paths and prints their plans and results.
use locpath::simple_node::{attr, doc, elem, text};
use locpath::{
    Axis, DynamicContextBuilder, Error, Expr, NodeTest, Path, PathPlan, SimpleNode, StaticContext, Step, XdmItem,
    XdmNode, compile_path,
};

fn main() -> Result<(), Error> {
    // <shelf><book lang="en"><title>Dune</title></book><book lang="de"><title>Momo</title></book></shelf>
    let document = doc()
        .child(
            elem("shelf")
                .child(elem("book").attr(attr("lang", "en")).child(elem("title").child(text("Dune"))))
                .child(elem("book").attr(attr("lang", "de")).child(elem("title").child(text("Momo")))),
        )
        .build();
    let sc = StaticContext::default();

    let has_lang = Expr::Path(Box::new(PathPlan::Generic(Path::new(
        Expr::ContextItem,
        vec![Expr::step(Axis::Attribute, NodeTest::name("lang"))],
    )?)));
    let paths: Vec<Vec<Expr<SimpleNode>>> = vec![
        vec![Expr::step(Axis::DescendantOrSelf, NodeTest::AnyKind), Expr::step(Axis::Child, NodeTest::name("title"))],
        vec![
            Expr::step(Axis::Child, NodeTest::name("shelf")),
            Step::new(Axis::Child, NodeTest::name("book")).with_predicate(has_lang).into(),
            Expr::step(Axis::Child, NodeTest::name("title")),
        ],
        vec![Expr::step(Axis::Descendant, NodeTest::name("book")), Expr::call("name", vec![])?],
    ];

    for pipeline in paths {
        let plan = compile_path(Expr::Root, pipeline, &sc)?;
        let mut ctx = DynamicContextBuilder::new().with_context_item(XdmItem::Node(document.clone())).build();
        let result = plan.evaluate(&mut ctx)?;
        println!("{plan}");
        print!("{}", plan.explain());
        for item in &result {
            match item {
                XdmItem::Node(n) => println!("  => {:?} {}", n.kind(), n.string_value()),
                XdmItem::Atomic(a) => println!("  => {a}"),
            }
        }
        println!("  ({} navigations)", ctx.stats.navigations);
    }
    Ok(())
}
