//! C# renderings

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use super::{Rendering, Requirement, SupportCode};
use crate::middle::ir::BuiltinOperator;

use SupportCode::*;

const SYSTEM: Requirement = Requirement::Using("System");

pub(super) fn operator(op: BuiltinOperator) -> Option<Rendering> {
    use BuiltinOperator as Op;
    let rendering = match op {
        Op::BooleanNegation => Rendering::bare(Prefix("!")),
        Op::BitwiseAnd => Rendering::bare(Infix("&")),
        Op::BitwiseOr => Rendering::bare(Infix("|")),
        Op::IsNull => Rendering::bare(Template("{0} == null")),
        Op::NotNull => Rendering::bare(Template("{0} != null")),

        Op::DivFltFlt | Op::DivIntInt => Rendering::bare(Infix("/")),
        Op::DivIntIntSafe => Rendering::core(Call("Core.DivSafe")),
        Op::ModFltFlt | Op::ModIntInt => Rendering::bare(Infix("%")),
        Op::ModIntIntSafe => Rendering::core(Call("Core.ModSafe")),
        Op::MinusFlt | Op::MinusInt => Rendering::bare(Prefix("-")),
        Op::MinusFltFlt | Op::MinusIntInt => Rendering::bare(Infix("-")),
        Op::PlusFltFlt | Op::PlusIntInt => Rendering::bare(Infix("+")),
        Op::TimesFltFlt | Op::TimesIntInt => Rendering::bare(Infix("*")),
        Op::PowFltFlt => Rendering::with(Call("Math.Pow"), SYSTEM),

        Op::LtFltFlt | Op::LtIntInt => Rendering::bare(Infix("<")),
        Op::LeFltFlt | Op::LeIntInt => Rendering::bare(Infix("<=")),
        Op::GtFltFlt | Op::GtIntInt => Rendering::bare(Infix(">")),
        Op::GeFltFlt | Op::GeIntInt => Rendering::bare(Infix(">=")),
        Op::LtStrStr => Rendering::bare(Template("string.CompareOrdinal({0}, {1}) < 0")),
        Op::LeStrStr => Rendering::bare(Template("string.CompareOrdinal({0}, {1}) <= 0")),
        Op::GtStrStr => Rendering::bare(Template("string.CompareOrdinal({0}, {1}) > 0")),
        Op::GeStrStr => Rendering::bare(Template("string.CompareOrdinal({0}, {1}) >= 0")),
        Op::LtGeneric => Rendering::core(Call("Core.GenericLt")),
        Op::LeGeneric => Rendering::core(Call("Core.GenericLe")),
        Op::GtGeneric => Rendering::core(Call("Core.GenericGt")),
        Op::GeGeneric => Rendering::core(Call("Core.GenericGe")),

        // C# string equality is by value
        Op::EqFltFlt | Op::EqIntInt | Op::EqStrStr => Rendering::bare(Infix("==")),
        Op::NeFltFlt | Op::NeIntInt | Op::NeStrStr => Rendering::bare(Infix("!=")),
        Op::EqGeneric => Rendering::core(Call("Core.GenericEq")),
        Op::NeGeneric => Rendering::core(Template("!Core.GenericEq({0}, {1})")),

        Op::CmpFltFlt | Op::CmpIntInt => Rendering::bare(MethodCall("CompareTo")),
        Op::CmpStrStr => Rendering::bare(Call("string.CompareOrdinal")),
        Op::CmpGeneric => Rendering::core(Call("Core.GenericCmp")),

        Op::StrCat => Rendering::bare(Call("string.Concat")),
        Op::Listify => Rendering::core(Call("Core.Listify")),
        Op::Print => Rendering::with(Call("Console.WriteLine"), SYSTEM),
        Op::Panic => Rendering::core(Call("Core.Panic")),
    };
    Some(rendering)
}

pub(super) static CONNECTED: Lazy<IndexMap<&'static str, Rendering>> = Lazy::new(|| {
    IndexMap::from([
        // coroutines
        ("Generator::wrap", Rendering::core(Call("Generator.Wrap"))),
        ("Async::launch", Rendering::core(Call("Async.Launch"))),
        ("Generator::valueResult", Rendering::core(Call("Generator.ValueResult"))),
        ("Generator::doneResult", Rendering::core(Call("Generator.DoneResult"))),
        ("Promise::awakeUpon", Rendering::core(Call("Promise.AwakeUpon"))),
        ("Promise::result", Rendering::core(Call("Promise.Result"))),
        // failures travel as exceptions
        ("Failure::attempt", Rendering::core(Template("Failure.Attempt(() => {0})"))),
        ("Failure::isFailure", Rendering::bare(Member("IsFailure"))),
        ("Failure::unwrap", Rendering::bare(Member("Value"))),
        ("Failure::propagate", Rendering::bare(Member("Failure"))),
        ("Failure::new", Rendering::core(Template("new Bubble()"))),
        // standard library
        ("Console::log", Rendering::with(Call("Console.WriteLine"), SYSTEM)),
        ("String::length", Rendering::bare(Member("Length"))),
        ("String::isEmpty", Rendering::bare(Call("string.IsNullOrEmpty"))),
        ("String::fromInt", Rendering::bare(MethodCall("ToString"))),
        ("Int::toFloat64", Rendering::bare(Template("(double) {0}"))),
        ("Float64::toInt", Rendering::core(Call("Core.ToIntSafe"))),
        ("List::length", Rendering::bare(Member("Count"))),
        ("List::get", Rendering::bare(Template("{0}[{1}]"))),
        ("List::toList", Rendering::with(Call("Enumerable.ToList"), Requirement::Using("System.Linq"))),
        ("ListBuilder::new", Rendering::core(Call("Core.NewListBuilder"))),
        ("ListBuilder::add", Rendering::bare(MethodCall("Add"))),
        ("Map::get", Rendering::core(Call("Core.MapGet"))),
        ("Date::today", Rendering::with(Template("DateTime.Today"), SYSTEM)),
    ])
});
